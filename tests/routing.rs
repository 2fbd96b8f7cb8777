//! Delivery rules: users, groups, privilege gates and cross-movie routing.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use multiuser_server::config::{MovieOverrides, ServerSettings};
use multiuser_server::core::value::Value;
use multiuser_server::directory::movie::Movie;
use multiuser_server::directory::user::{Outbound, OutboxReceiver, User};
use multiuser_server::directory::Server;
use multiuser_server::error::CommandError;
use multiuser_server::protocol::error_code::ErrorCode;
use multiuser_server::protocol::message::Message;
use std::sync::Arc;
use tokio::sync::mpsc;

fn server_with(mutator: impl FnOnce(&mut ServerSettings)) -> Arc<Server> {
    Server::new(ServerSettings::default_with_overrides(mutator)).expect("server")
}

fn connect(server: &Server, movie: &str, name: &str) -> (Arc<User>, OutboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (user, _) = server
        .logon(movie, name, "", "127.0.0.1", tx)
        .expect("logon");
    (user, rx)
}

fn send(server: &Server, from: &Arc<User>, to: &str, content: Value) {
    let movie = server.find_movie(&from.movie_name()).unwrap();
    let msg = Message::new("chat", from.name(), vec![to.to_string()], content);
    server.handle_message(&movie, from, &msg);
}

fn received(rx: &mut OutboxReceiver) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        if let Outbound::Message(msg) = item {
            out.push(msg);
        }
    }
    out
}

#[test]
fn test_direct_message_is_readdressed() {
    let server = server_with(|_| {});
    let (ann, _ra) = connect(&server, "Main", "ann");
    let (_bob, mut rb) = connect(&server, "Main", "Bob");

    send(&server, &ann, "BOB", Value::from("hello"));

    let got = received(&mut rb);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].recipients, vec!["Bob".to_string()]);
    assert_eq!(got[0].sender, "ann");
    assert_eq!(got[0].content, Value::from("hello"));
}

#[test]
fn test_group_reaches_exactly_current_members() {
    let server = server_with(|_| {});
    let movie = server.get_or_create_movie("Main");
    let (ann, mut ra) = connect(&server, "Main", "ann");
    let (bob, mut rb) = connect(&server, "Main", "bob");
    let (cat, mut rc) = connect(&server, "Main", "cat");

    for user in [&ann, &bob, &cat] {
        movie.join_group(user, "@Room").unwrap();
    }
    movie.leave_group(&cat, "@room").unwrap();

    send(&server, &ann, "@ROOM", Value::Integer(7));

    let to_ann = received(&mut ra);
    let to_bob = received(&mut rb);
    assert_eq!(to_ann.len(), 1);
    assert_eq!(to_bob.len(), 1);
    assert_eq!(to_bob[0].recipients, vec!["@Room".to_string()]);
    assert_eq!(to_bob[0].subject, "chat");
    assert!(received(&mut rc).is_empty());
}

#[test]
fn test_below_messaging_level_is_denied() {
    let server = server_with(|s| {
        s.server.default_user_level = 10;
        s.movie_defaults.messaging_user_level = 20;
    });
    let (ann, mut ra) = connect(&server, "Main", "ann");
    let (_bob, mut rb) = connect(&server, "Main", "bob");

    send(&server, &ann, "bob", Value::from("secret"));

    let replies = received(&mut ra);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].error(), Some(ErrorCode::NotPermittedWithUserLevel));
    assert_eq!(replies[0].content, Value::Void);
    assert!(received(&mut rb).is_empty());
}

#[test]
fn test_all_users_gate_drops_silently() {
    let server = server_with(|s| s.movie_defaults.messaging_all_user_level = 50);
    let (ann, mut ra) = connect(&server, "Main", "ann");
    let (_bob, mut rb) = connect(&server, "Main", "bob");

    send(&server, &ann, "@AllUsers", Value::from("everyone"));
    assert!(received(&mut ra).is_empty());
    assert!(received(&mut rb).is_empty());

    ann.set_level(50);
    send(&server, &ann, "@allusers", Value::from("everyone"));
    assert_eq!(received(&mut ra).len(), 1);
    assert_eq!(received(&mut rb).len(), 1);
}

#[test]
fn test_missing_targets_are_silent() {
    let server = server_with(|_| {});
    let (ann, mut ra) = connect(&server, "Main", "ann");

    send(&server, &ann, "nobody", Value::Void);
    send(&server, &ann, "@nowhere", Value::Void);
    send(&server, &ann, "system.onlytwo", Value::Void);
    send(&server, &ann, "nobody@NoSuchMovie", Value::Void);

    assert!(received(&mut ra).is_empty());
}

#[test]
fn test_cross_movie_rewrites_sender() {
    let server = server_with(|_| {});
    let (ann, _ra) = connect(&server, "Main", "ann");
    let (_bob_main, mut rbm) = connect(&server, "Main", "bob");
    let (_bob_other, mut rbo) = connect(&server, "Other", "bob");

    send(&server, &ann, "bob@Other", Value::from("hi"));

    assert!(received(&mut rbm).is_empty());
    let got = received(&mut rbo);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].sender, "ann@Main");
    assert_eq!(got[0].recipients, vec!["bob".to_string()]);
}

#[test]
fn test_all_movies_expands_to_every_movie() {
    let server = server_with(|_| {});
    let (ann, mut ra) = connect(&server, "Main", "ann");
    let (_b, mut rb) = connect(&server, "Other", "bob");
    let (_c, mut rc) = connect(&server, "Third", "cat");

    send(&server, &ann, "@AllUsers@AllMovies", Value::from("news"));

    let own = received(&mut ra);
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].sender, "ann");
    assert_eq!(received(&mut rb)[0].sender, "ann@Main");
    assert_eq!(received(&mut rc)[0].sender, "ann@Main");
}

#[test]
fn test_last_user_removes_transient_movie_only() {
    let server = server_with(|s| {
        s.movies.insert(
            "Lobby".into(),
            MovieOverrides {
                persistent: Some(true),
                ..MovieOverrides::default()
            },
        );
    });
    let (ann, _ra) = connect(&server, "Main", "ann");
    let (bob, _rb) = connect(&server, "lobby", "bob");
    assert_eq!(server.movie_count(), 2);

    server.disconnect_user(&ann);
    server.disconnect_user(&bob);

    assert!(server.find_movie("Main").is_err());
    assert!(server.find_movie("Lobby").is_ok());
    assert_eq!(server.user_count(), 0);
}

#[test]
fn test_disconnect_leaves_groups_and_notifies_once() {
    let server = server_with(|s| s.movie_defaults.notify_disconnect = vec!["@Watchers".into()]);
    let movie = server.get_or_create_movie("Main");
    let (ann, _ra) = connect(&server, "Main", "ann");
    let (watcher, mut rw) = connect(&server, "Main", "watcher");
    movie.join_group(&ann, "@Chess").unwrap();
    movie.join_group(&watcher, "@Watchers").unwrap();

    server.disconnect_user(&ann);
    server.disconnect_user(&ann);

    assert_eq!(movie.find_group("@Chess").unwrap().member_count(), 0);
    assert_eq!(movie.all_users().member_count(), 1);

    let notices = received(&mut rw);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject, "Disconnected");
    assert_eq!(notices[0].sender, "System");
    assert_eq!(notices[0].content, Value::from("ann"));
}

/// Every member of every group must still be logged on to the movie.
fn assert_members_are_users(movie: &Movie) {
    let users = movie.users();
    for name in movie.group_names() {
        let group = movie.find_group(&name).unwrap();
        for member in group.members() {
            assert!(
                users.iter().any(|u| Arc::ptr_eq(u, &member)),
                "{} is in {name} but not in {}",
                member.name(),
                movie.name()
            );
        }
    }
}

#[test]
fn test_removed_user_can_neither_join_nor_send() {
    let server = server_with(|_| {});
    let movie = server.get_or_create_movie("Main");
    let (ann, _ra) = connect(&server, "Main", "ann");
    let (_bob, mut rb) = connect(&server, "Main", "bob");

    server.disconnect_user(&ann);
    assert_eq!(movie.user_count(), 1);

    // Frames already decoded when the disconnect landed still reach routing.
    let join = Message::new(
        "join",
        "ann",
        vec!["system.group.join".to_string()],
        Value::from("@g"),
    );
    server.handle_message(&movie, &ann, &join);
    let chat = Message::new("chat", "ann", vec!["bob".to_string()], Value::from("x"));
    server.handle_message(&movie, &ann, &chat);

    assert!(movie.find_group("@g").map_or(true, |g| g.member_count() == 0));
    assert_eq!(
        movie.join_group(&ann, "@g").err(),
        Some(CommandError::ErrorJoiningGroup)
    );
    assert_eq!(ann.group_count(), 0);
    assert!(received(&mut rb).is_empty());
    assert_members_are_users(&movie);
}

#[test]
fn test_groups_hold_only_logged_on_users() {
    let server = server_with(|_| {});
    let movie = server.get_or_create_movie("Main");
    let (ann, _ra) = connect(&server, "Main", "ann");
    let (bob, _rb) = connect(&server, "Main", "bob");
    let (cat, _rc) = connect(&server, "Main", "cat");
    for user in [&ann, &bob, &cat] {
        movie.join_group(user, "@Room").unwrap();
    }
    movie.join_group(&bob, "@Side").unwrap();

    server.disconnect_user(&bob);
    assert_members_are_users(&movie);
    assert_eq!(movie.find_group("@Room").unwrap().member_count(), 2);
    assert_eq!(movie.find_group("@Side").unwrap().member_count(), 0);

    server.delete_movie("Main").unwrap();
    assert!(server.find_movie("Main").is_err());
    assert_eq!(movie.user_count(), 0);
    assert_eq!(movie.find_group("@Room").unwrap().member_count(), 0);
    assert_eq!(movie.all_users().member_count(), 0);
    assert!(!ann.is_connected() && !cat.is_connected());
}

#[test]
fn test_order_preserved_per_sender_and_target() {
    let server = server_with(|_| {});
    let (ann, _ra) = connect(&server, "Main", "ann");
    let (_bob, mut rb) = connect(&server, "Main", "bob");

    for i in 0..100 {
        send(&server, &ann, "bob", Value::Integer(i));
    }

    let got: Vec<Value> = received(&mut rb).into_iter().map(|m| m.content).collect();
    let expected: Vec<Value> = (0..100).map(Value::Integer).collect();
    assert_eq!(got, expected);
}
