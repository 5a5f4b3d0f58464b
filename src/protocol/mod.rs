//! Wire protocol of the NES server.
//!
//! Requests are JSON objects made of one or more command fragments, sent as a single line:
//!
//! ```text
//! {"key":{"value": "Right"}}
//! {"config":{"speed": "maximum"}}
//! {"game":{"value": "Info"}}
//! ```
//!
//! Replies are JSON objects followed by `\r\n\r\n\r\n`:
//!
//! ```text
//! {"mario":{"x":40,"y":176},"lives":2,"state":8,"tiles":{"-1":[0,0,0],"0":[1,1,1],"1":[0,0,0]}}
//! {"endpoint":{"host":"10.0.0.3","port":"4561"}}
//! ```
//!
//! [`messages`] builds requests, [`parser`] decodes replies.

pub mod messages;
pub mod parser;

pub use messages::{Command, Envelope, GameQuery};
pub use parser::{parse_endpoint, parse_game_state, tile_row_index, Reply};
