use bson::doc;

use crate::{
    command_responses::IsMasterCommandResponse,
    conn::{Command, CommandResponse, DRIVER_NAME},
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct IsMaster {
    /// Whether to attach the client metadata document, as the first exchange on a
    /// connection does.
    handshake: bool,
}

impl IsMaster {
    pub(crate) fn handshake() -> Self {
        Self { handshake: true }
    }
}

impl Operation for IsMaster {
    type O = IsMasterCommandResponse;
    const NAME: &'static str = "isMaster";

    fn build(&self) -> Result<Command> {
        let body = if self.handshake {
            doc! {
                Self::NAME: 1,
                "client": {
                    "driver": {
                        "name": DRIVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "os": {
                        "type": std::env::consts::OS,
                        "architecture": std::env::consts::ARCH,
                    },
                },
            }
        } else {
            doc! { Self::NAME: 1 }
        };

        Ok(Command::new(Self::NAME, "admin", body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.body()
    }
}
