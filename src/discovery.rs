//! Worker assignment through the master endpoint.
//!
//! The master is a load balancer: each `get endpoint` request is answered with the next
//! worker in its rotation. One request is made per episode and the master connection is
//! closed as soon as the reply is decoded.

use tracing::{info, instrument};

use crate::configuration::Configuration;
use crate::endpoint::Endpoint;
use crate::error::EpisodeError;
use crate::protocol::{parse_endpoint, Command};
use crate::transport::Client;

/// Ask `master` which worker should run the next episode.
///
/// # Errors
/// Connect, send or receive failures on the master connection, or a reply without
/// `endpoint.host` / `endpoint.port`.
#[instrument(skip_all, fields(%master))]
pub fn discover(master: &Endpoint, config: &Configuration) -> Result<Endpoint, EpisodeError> {
    let mut client = Client::connect(master, config.connect_timeout)?;
    let reply = client.request(
        &Command::GetEndpoint.message(),
        config.send_timeout,
        config.receive_timeout,
    )?;
    let endpoint = parse_endpoint(&reply)?;
    info!(%endpoint, "worker assigned");
    Ok(endpoint)
}
