use crate::db::{user_repo, Database, DatabaseError};

use super::User;

/// Lookup and storage of user records.
#[derive(Clone)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, user: &User) -> Result<(), DatabaseError> {
        self.db.with_conn(|conn| user_repo::insert(conn, user))
    }

    pub fn update(&self, user: &User) -> Result<(), DatabaseError> {
        self.db.with_conn(|conn| user_repo::update(conn, user))
    }

    pub fn get(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        self.db.with_conn(|conn| user_repo::find(conn, id))
    }
}
