use bson::{doc, Bson, Document};

use crate::{
    command_responses::UsersInfoCommandResponse,
    conn::{Command, CommandResponse},
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct UsersInfo {
    db: String,
    /// The user(s) to look up: a name, a `{ user, db }` document, an array of either, or
    /// `1` for every user of the database.
    target: Bson,
}

impl UsersInfo {
    pub(crate) fn new(db: String, target: Bson) -> Self {
        Self { db, target }
    }
}

impl Operation for UsersInfo {
    type O = Vec<Document>;
    const NAME: &'static str = "usersInfo";

    fn build(&self) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.target.clone(),
        };

        Ok(Command::new(Self::NAME, self.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: UsersInfoCommandResponse = response.body()?;
        Ok(body.users)
    }
}
