//! Outbound message builders.
//!
//! Every builder returns a bare field fragment such as `"key":{"value": "Right"}`.
//! Fragments are combined with [`Envelope::append`] and turned into the transmitted JSON
//! object by [`Envelope::wrap`].

use crate::endpoint::Endpoint;
use crate::game::{Key, Speed};

/// Values of the `game` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameQuery {
    /// Tile neighbourhood only.
    Tiles,
    /// Position, lives, state and tiles.
    Info,
    /// Restart the level.
    Reset,
    /// Current frame as JPEG.
    Image,
}

impl GameQuery {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            GameQuery::Tiles => "Tiles",
            GameQuery::Info => "Info",
            GameQuery::Reset => "Reset",
            GameQuery::Image => "Image",
        }
    }
}

/// A single logical command, as carried by one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Press a controller key.
    Press(Key),
    /// Query or drive the game.
    Game(GameQuery),
    /// Frames to run without interaction.
    ConfigFrame(i32),
    /// JPEG quality of [`GameQuery::Image`] replies.
    ConfigImage(i32),
    /// Frame divisor.
    ConfigDivisor(i32),
    /// Emulation speed.
    ConfigSpeed(Speed),
    /// Ask the broker for a worker endpoint.
    GetEndpoint,
    /// Broker reply carrying a worker endpoint.
    SendEndpoint(Endpoint),
}

impl Command {
    /// The fragment for this command.
    pub fn fragment(&self) -> String {
        match self {
            Command::Press(key) => press(*key),
            Command::Game(GameQuery::Tiles) => game_tiles(),
            Command::Game(GameQuery::Info) => game_info(),
            Command::Game(GameQuery::Reset) => game_reset(),
            Command::Game(GameQuery::Image) => game_image(),
            Command::ConfigFrame(frame) => config_frame(*frame),
            Command::ConfigImage(quality) => config_image(*quality),
            Command::ConfigDivisor(divisor) => config_divisor(*divisor),
            Command::ConfigSpeed(speed) => config_speed(*speed),
            Command::GetEndpoint => get_endpoint(),
            Command::SendEndpoint(endpoint) => send_endpoint(endpoint),
        }
    }

    /// This command alone, wrapped and ready to send.
    pub fn message(&self) -> String {
        let mut envelope = Envelope::new();
        envelope.append(&self.fragment());
        envelope.wrap()
    }
}

/// Press `key`.
pub fn press(key: Key) -> String {
    format!("\"key\":{{\"value\": \"{}\"}}", key.as_str())
}

fn game(query: GameQuery) -> String {
    format!("\"game\":{{\"value\": \"{}\"}}", query.as_str())
}

/// Ask for the tile neighbourhood.
pub fn game_tiles() -> String {
    game(GameQuery::Tiles)
}

/// Ask for position, lives, state and tiles.
pub fn game_info() -> String {
    game(GameQuery::Info)
}

/// Restart the level.
pub fn game_reset() -> String {
    game(GameQuery::Reset)
}

/// Ask for the current frame as JPEG.
pub fn game_image() -> String {
    game(GameQuery::Image)
}

/// Frames to run without any interaction.
pub fn config_frame(frame: i32) -> String {
    format!("\"config\":{{\"frame\": {frame}}}")
}

/// JPEG quality of image replies.
pub fn config_image(quality: i32) -> String {
    format!("\"config\":{{\"image\": {quality}}}")
}

/// Frame divisor.
pub fn config_divisor(divisor: i32) -> String {
    format!("\"config\":{{\"divisor\": {divisor}}}")
}

/// Emulation speed.
pub fn config_speed(speed: Speed) -> String {
    format!("\"config\":{{\"speed\": \"{}\"}}", speed.as_str())
}

/// Ask the broker for the endpoint of the next worker.
pub fn get_endpoint() -> String {
    "\"endpoint\":{\"value\": \"get\"}".to_string()
}

/// Broker reply naming a worker.
pub fn send_endpoint(endpoint: &Endpoint) -> String {
    // host and port are escaped by serde_json
    let body = serde_json::to_string(endpoint).unwrap_or_else(|_| "{}".to_string());
    format!("\"endpoint\":{body}")
}

/// Fragments joined with commas, not yet wrapped in braces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    body: String,
}

impl Envelope {
    /// An envelope with no fragment.
    pub fn new() -> Envelope {
        Envelope::default()
    }

    /// Add a fragment, with a comma separator unless it is the first one.
    pub fn append(&mut self, fragment: &str) -> &mut Envelope {
        if !self.body.is_empty() {
            self.body.push(',');
        }
        self.body.push_str(fragment);
        self
    }

    /// True until the first non-empty fragment has been appended.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Joined fragments, without braces.
    pub fn as_str(&self) -> &str {
        &self.body
    }

    /// The transmitted JSON object.
    pub fn wrap(&self) -> String {
        format!("{{{}}}", self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_match_wire_format() {
        assert_eq!(press(Key::Right), "\"key\":{\"value\": \"Right\"}");
        assert_eq!(game_info(), "\"game\":{\"value\": \"Info\"}");
        assert_eq!(config_divisor(2), "\"config\":{\"divisor\": 2}");
        assert_eq!(
            config_speed(Speed::Maximum),
            "\"config\":{\"speed\": \"maximum\"}"
        );
        assert_eq!(
            Command::Game(GameQuery::Reset).message(),
            "{\"game\":{\"value\": \"Reset\"}}"
        );
    }

    #[test]
    fn first_append_has_no_leading_comma() {
        let mut envelope = Envelope::new();
        envelope.append(&press(Key::A));
        assert_eq!(envelope.as_str(), press(Key::A));
        assert_eq!(envelope.wrap(), "{\"key\":{\"value\": \"A\"}}");
    }

    #[test]
    fn n_appends_give_n_minus_one_separators() {
        // fragments without inner commas, so every comma is a separator
        let fragments = [
            press(Key::Left),
            game_tiles(),
            config_frame(30),
            config_image(80),
            get_endpoint(),
        ];
        for n in 1..=fragments.len() {
            let mut envelope = Envelope::new();
            for fragment in &fragments[..n] {
                envelope.append(fragment);
            }
            assert_eq!(envelope.as_str().matches(',').count(), n - 1);
            assert!(!envelope.as_str().starts_with(','));
        }
    }

    #[test]
    fn wrapped_envelopes_are_json_objects() {
        let mut envelope = Envelope::new();
        envelope
            .append(&config_frame(30))
            .append(&press(Key::B))
            .append(&game_info());
        let value: serde_json::Value = serde_json::from_str(&envelope.wrap()).unwrap();
        assert!(value.is_object());
        assert_eq!(value["key"]["value"], "B");
        assert_eq!(value["config"]["frame"], 30);
    }

    #[test]
    fn empty_envelope_wraps_to_empty_object() {
        let envelope = Envelope::new();
        assert!(envelope.is_empty());
        assert_eq!(envelope.wrap(), "{}");
    }

    #[test]
    fn endpoint_reply_is_escaped() {
        let fragment = send_endpoint(&Endpoint::new("a\"b", "1"));
        let value: serde_json::Value = serde_json::from_str(&format!("{{{fragment}}}")).unwrap();
        assert_eq!(value["endpoint"]["host"], "a\"b");
    }
}
