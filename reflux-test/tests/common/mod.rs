//! Shared fixtures: users and an in-memory repository

#![allow(dead_code)]

use reflux::{Flux, Mono};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
}

impl User {
    pub fn new(username: &str, firstname: &str, lastname: &str) -> Self {
        Self {
            username: username.to_string(),
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
        }
    }

    /// A user known only by username
    pub fn named(username: &str) -> Self {
        Self::new(username, "", "")
    }

    pub fn capitalized(&self) -> Self {
        Self {
            username: self.username.to_uppercase(),
            firstname: self.firstname.to_uppercase(),
            lastname: self.lastname.to_uppercase(),
        }
    }
}

pub fn skyler() -> User {
    User::new("swhite", "Skyler", "White")
}

pub fn jesse() -> User {
    User::new("jpinkman", "Jesse", "Pinkman")
}

pub fn walter() -> User {
    User::new("wwhite", "Walter", "White")
}

pub fn saul() -> User {
    User::new("sgoodman", "Saul", "Goodman")
}

/// Canned user repository
pub struct UserRepository {
    users: Vec<User>,
}

impl Default for UserRepository {
    fn default() -> Self {
        Self {
            users: vec![skyler(), jesse(), walter(), saul()],
        }
    }
}

impl UserRepository {
    pub fn find_all(&self) -> Flux<User> {
        Flux::from_iter(self.users.clone())
    }

    pub fn find_first(&self) -> Mono<User> {
        Mono::just_or_empty(self.users.first().cloned())
    }
}
