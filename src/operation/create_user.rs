use bson::{doc, Bson};

use crate::{
    conn::{Command, CommandResponse},
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct CreateUser {
    db: String,
    name: String,
    password: Option<String>,
    roles: Vec<Bson>,
}

impl CreateUser {
    pub(crate) fn new(db: String, name: String, password: Option<String>, roles: Vec<Bson>) -> Self {
        Self {
            db,
            name,
            password,
            roles,
        }
    }
}

impl Operation for CreateUser {
    type O = ();
    const NAME: &'static str = "createUser";

    fn build(&self) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.name.clone(),
            "roles": self.roles.clone(),
        };

        if let Some(ref password) = self.password {
            body.insert("pwd", password.clone());
        }

        Ok(Command::new(Self::NAME, self.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()
    }
}
