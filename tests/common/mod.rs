#![allow(dead_code)]

use modelkit::{Database, Entity, EntityBase, ModelConfig, Password, TokenSource};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Entity)]
#[entity(table = "users")]
pub struct User {
    #[entity(base)]
    pub base: EntityBase,
    #[entity(unique)]
    pub email: String,
    pub name: String,
    #[entity(password)]
    pub password: Password,
    #[entity(readonly)]
    pub signup_source: String,
}

impl User {
    pub fn new(email: &str, name: &str, password: &str) -> Self {
        Self {
            base: EntityBase::new(),
            email: email.to_string(),
            name: name.to_string(),
            password: Password::plain(password),
            signup_source: "web".to_string(),
        }
    }
}

#[derive(Debug, Clone, Entity)]
pub struct Note {
    #[entity(base)]
    pub base: EntityBase,
    #[entity(owner)]
    pub user_id: i64,
    pub title: String,
    pub body: Option<String>,
    pub rank: i64,
    #[entity(skip)]
    pub cached_len: usize,
}

impl Note {
    pub fn new(user_id: i64, title: &str, rank: i64) -> Self {
        Self {
            base: EntityBase::new(),
            user_id,
            title: title.to_string(),
            body: None,
            rank,
            cached_len: title.len(),
        }
    }
}

/// Hands out a fixed sequence of tokens, then repeats the last one.
pub struct ScriptedTokens {
    queue: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedTokens {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            queue: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            last: Mutex::new(String::new()),
        }
    }
}

impl TokenSource for ScriptedTokens {
    fn next_token(&self, _bytes: usize) -> String {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone()
    }
}

/// Low bcrypt cost keeps the suite fast.
pub fn test_config() -> ModelConfig {
    ModelConfig::default().password_cost(4)
}

pub async fn register_all(db: &Database) -> anyhow::Result<()> {
    db.register::<User>().await?;
    db.register::<Note>().await?;
    Ok(())
}

pub async fn database() -> anyhow::Result<Database> {
    let db = Database::new(test_config())?;
    register_all(&db).await?;
    Ok(db)
}

pub async fn database_with_tokens(tokens: &[&str], max_attempts: u32) -> anyhow::Result<Database> {
    let db = Database::builder()
        .config(test_config().max_token_attempts(max_attempts))
        .token_source(ScriptedTokens::new(tokens))
        .build()?;
    register_all(&db).await?;
    Ok(db)
}
