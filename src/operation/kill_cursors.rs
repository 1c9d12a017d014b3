use bson::doc;

use crate::{
    coll::Namespace,
    conn::{Command, CommandResponse},
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct KillCursors {
    ns: Namespace,
    cursor_ids: Vec<i64>,
}

impl KillCursors {
    pub(crate) fn new(ns: Namespace, cursor_ids: Vec<i64>) -> Self {
        Self { ns, cursor_ids }
    }
}

impl Operation for KillCursors {
    type O = ();
    const NAME: &'static str = "killCursors";

    fn build(&self) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "cursors": self.cursor_ids.clone(),
        };

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::{KillCursors, Operation};
    use crate::coll::Namespace;

    #[test]
    fn build_lists_the_cursor_ids() {
        let command = KillCursors::new(Namespace::new("db", "coll"), vec![42, 43])
            .build()
            .unwrap();

        assert_eq!(
            command.body,
            doc! { "killCursors": "coll", "cursors": [42_i64, 43_i64] }
        );
    }
}
