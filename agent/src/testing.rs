use std::collections::VecDeque;
use std::sync::Mutex;

use ai::{AiError, ChatModel, Message, Tool};
use async_trait::async_trait;
use db::{QueryPolicy, SqliteDatabase};

/// Replays canned assistant messages and records what it was sent.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Message>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub(crate) fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(vec![]),
        }
    }

    /// Conversations passed to each `complete` call, in order.
    pub(crate) fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[Message], _tools: &[Tool]) -> Result<Message, AiError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(AiError::EmptyResponse)
    }
}

pub(crate) async fn seeded_database() -> SqliteDatabase {
    let mut db = SqliteDatabase::in_memory(QueryPolicy::ReadOnly)
        .await
        .unwrap();
    db.execute_script(
        r#"
CREATE TABLE actor (
  actor_id INTEGER PRIMARY KEY,
  first_name VARCHAR(45) NOT NULL,
  last_name VARCHAR(45) NOT NULL
);
CREATE TABLE film (film_id INTEGER PRIMARY KEY, title TEXT NOT NULL);
INSERT INTO actor VALUES (1, 'PENELOPE', 'GUINESS');
INSERT INTO actor VALUES (2, 'NICK', 'WAHLBERG');
INSERT INTO actor VALUES (3, 'ED', 'CHASE');
INSERT INTO actor VALUES (4, 'JENNIFER', 'DAVIS');
INSERT INTO actor VALUES (5, 'JOHNNY', 'LOLLOBRIGIDA');
INSERT INTO actor VALUES (6, 'BETTE', 'NICHOLSON');
INSERT INTO film VALUES (1, 'ACADEMY DINOSAUR');
"#,
    )
    .await
    .unwrap();
    db
}
