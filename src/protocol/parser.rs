//! Inbound reply decoding.
//!
//! Replies are JSON objects; fields are looked up by dotted path (`mario.x`,
//! `endpoint.host`). Integers may arrive as JSON numbers or as numeric strings, strings as
//! strings or numbers, mirroring the loose typing of the emulator's JSON writer.

use serde_json::{Map, Value};

use crate::endpoint::Endpoint;
use crate::error::ParseError;
use crate::game::{GameState, Key, Speed, TileGrid};
use crate::protocol::messages::{Command, GameQuery};

/// Largest tile view accepted; bigger grids are rejected before allocating.
pub const MAX_TILE_SIDE: usize = 255;

/// A decoded JSON object with typed field access.
#[derive(Debug, Clone)]
pub struct Reply {
    root: Map<String, Value>,
}

impl Reply {
    /// Parse `data` as a JSON object.
    ///
    /// # Errors
    /// [`ParseError::Json`] for invalid JSON, [`ParseError::NotAnObject`] otherwise.
    pub fn parse(data: &str) -> Result<Reply, ParseError> {
        match serde_json::from_str(data.trim())? {
            Value::Object(root) => Ok(Reply { root }),
            _ => Err(ParseError::NotAnObject),
        }
    }

    fn lookup(&self, path: &str) -> Result<&Value, ParseError> {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or_default();
        let mut value = self
            .root
            .get(first)
            .ok_or_else(|| ParseError::MissingField(path.to_string()))?;
        for part in parts {
            value = value
                .get(part)
                .ok_or_else(|| ParseError::MissingField(path.to_string()))?;
        }
        Ok(value)
    }

    /// Integer at `path`.
    ///
    /// # Errors
    /// Missing field, or a value that is not an `i32`.
    pub fn int(&self, path: &str) -> Result<i32, ParseError> {
        as_int(self.lookup(path)?).ok_or_else(|| ParseError::WrongType {
            path: path.to_string(),
            expected: "an integer",
        })
    }

    /// String at `path`; numbers are rendered as their decimal text.
    ///
    /// # Errors
    /// Missing field, or a value that is neither string nor number.
    pub fn string(&self, path: &str) -> Result<String, ParseError> {
        match self.lookup(path)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(ParseError::WrongType {
                path: path.to_string(),
                expected: "a string",
            }),
        }
    }

    /// `(mario.x, mario.y)`.
    ///
    /// # Errors
    /// See [`Reply::int`].
    pub fn mario_position(&self) -> Result<(i32, i32), ParseError> {
        Ok((self.int("mario.x")?, self.int("mario.y")?))
    }

    /// `lives`.
    ///
    /// # Errors
    /// See [`Reply::int`].
    pub fn lives(&self) -> Result<i32, ParseError> {
        self.int("lives")
    }

    /// `state`, the raw player-state code.
    ///
    /// # Errors
    /// See [`Reply::int`].
    pub fn player_state(&self) -> Result<i32, ParseError> {
        self.int("state")
    }

    /// `coins`, if present.
    ///
    /// # Errors
    /// Present but not an integer.
    pub fn coins(&self) -> Result<Option<i32>, ParseError> {
        match self.int("coins") {
            Ok(coins) => Ok(Some(coins)),
            Err(ParseError::MissingField(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `endpoint.host` and `endpoint.port`.
    ///
    /// # Errors
    /// See [`Reply::string`].
    pub fn endpoint(&self) -> Result<Endpoint, ParseError> {
        Ok(Endpoint {
            host: self.string("endpoint.host")?,
            port: self.string("endpoint.port")?,
        })
    }

    /// `tiles`, remapped into a dense grid (see [`tile_row_index`]).
    ///
    /// # Errors
    /// Missing `tiles`, non-integer keys or cells, an even or empty key count, more than
    /// [`MAX_TILE_SIDE`] keys, rows longer than the grid, or two keys landing on the same
    /// row.
    pub fn tiles(&self) -> Result<TileGrid, ParseError> {
        let Value::Object(rows) = self.lookup("tiles")? else {
            return Err(ParseError::WrongType {
                path: "tiles".to_string(),
                expected: "an object",
            });
        };

        let side = rows.len();
        if side % 2 == 0 {
            return Err(ParseError::MalformedGrid(format!(
                "{side} rows, expected an odd count"
            )));
        }
        if side > MAX_TILE_SIDE {
            return Err(ParseError::MalformedGrid(format!(
                "{side} rows, at most {MAX_TILE_SIDE} supported"
            )));
        }

        let mut grid = TileGrid::zeros(side);
        let mut filled = vec![false; side];
        for (key, row) in rows {
            let offset: i64 = key
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidTileKey(key.clone()))?;
            let index = tile_row_index(offset, side).ok_or_else(|| {
                ParseError::MalformedGrid(format!(
                    "row offset {offset} outside a {side}x{side} grid"
                ))
            })?;
            if std::mem::replace(&mut filled[index], true) {
                return Err(ParseError::MalformedGrid(format!(
                    "row offset {offset} lands on an already filled row"
                )));
            }

            let Value::Array(cells) = row else {
                return Err(ParseError::WrongType {
                    path: format!("tiles.{key}"),
                    expected: "an array",
                });
            };
            if cells.len() > side {
                return Err(ParseError::MalformedGrid(format!(
                    "row {key} has {} cells, grid side is {side}",
                    cells.len()
                )));
            }
            // checked above: index < side
            let target = grid.row_mut(index).unwrap_or_default();
            for (col, cell) in cells.iter().enumerate() {
                target[col] = as_int(cell).ok_or_else(|| ParseError::WrongType {
                    path: format!("tiles.{key}[{col}]"),
                    expected: "an integer",
                })?;
            }
        }
        Ok(grid)
    }

    /// Every field needed by the step loop.
    ///
    /// # Errors
    /// The first missing or mistyped field.
    pub fn game_state(&self) -> Result<GameState, ParseError> {
        let (mario_x, mario_y) = self.mario_position()?;
        Ok(GameState {
            tiles: self.tiles()?,
            mario_x,
            mario_y,
            lives: self.lives()?,
            player_state: self.player_state()?,
            coins: self.coins()?,
        })
    }

    /// Decode an outbound envelope back into its commands, in key order.
    ///
    /// A JSON object keeps one value per key, so fragments sharing a name collapse to the
    /// last one; `config` fields are split into one command each.
    ///
    /// # Errors
    /// Unknown command names or values.
    pub fn commands(&self) -> Result<Vec<Command>, ParseError> {
        let mut commands = Vec::new();
        for name in self.root.keys() {
            match name.as_str() {
                "key" => {
                    let value = self.string("key.value")?;
                    let key = Key::ALL
                        .into_iter()
                        .find(|k| k.as_str() == value)
                        .ok_or(ParseError::UnknownCommand(format!("key {value}")))?;
                    commands.push(Command::Press(key));
                }
                "game" => {
                    let value = self.string("game.value")?;
                    let query = [
                        GameQuery::Tiles,
                        GameQuery::Info,
                        GameQuery::Reset,
                        GameQuery::Image,
                    ]
                    .into_iter()
                    .find(|q| q.as_str() == value)
                    .ok_or(ParseError::UnknownCommand(format!("game {value}")))?;
                    commands.push(Command::Game(query));
                }
                "config" => {
                    let Value::Object(fields) = self.lookup("config")? else {
                        return Err(ParseError::WrongType {
                            path: "config".to_string(),
                            expected: "an object",
                        });
                    };
                    for field in fields.keys() {
                        let path = format!("config.{field}");
                        commands.push(match field.as_str() {
                            "frame" => Command::ConfigFrame(self.int(&path)?),
                            "image" => Command::ConfigImage(self.int(&path)?),
                            "divisor" => Command::ConfigDivisor(self.int(&path)?),
                            "speed" => {
                                let speed: Speed = self
                                    .string(&path)?
                                    .parse()
                                    .map_err(ParseError::UnknownCommand)?;
                                Command::ConfigSpeed(speed)
                            }
                            other => {
                                return Err(ParseError::UnknownCommand(format!("config {other}")))
                            }
                        });
                    }
                }
                "endpoint" => {
                    if self.lookup("endpoint.value").is_ok() {
                        commands.push(Command::GetEndpoint);
                    } else {
                        commands.push(Command::SendEndpoint(self.endpoint()?));
                    }
                }
                other => return Err(ParseError::UnknownCommand(other.to_string())),
            }
        }
        Ok(commands)
    }
}

/// Decode a `game info` reply.
///
/// # Errors
/// See [`Reply::game_state`].
pub fn parse_game_state(data: &str) -> Result<GameState, ParseError> {
    Reply::parse(data)?.game_state()
}

/// Decode a broker reply.
///
/// # Errors
/// See [`Reply::endpoint`].
pub fn parse_endpoint(data: &str) -> Result<Endpoint, ParseError> {
    Reply::parse(data)?.endpoint()
}

/// Matrix row of the tile row keyed by signed `offset`, in a grid of `side` rows.
///
/// The server enumerates the neighbourhood by signed offsets. Offsets above 1 shift down by
/// one, negative offsets count up from the centre, `1` is the centre row and `0` goes to
/// the last row. For `side = 2r + 1` the offsets `-r..=r` fill every row exactly once.
pub fn tile_row_index(offset: i64, side: usize) -> Option<usize> {
    let n = i64::try_from(side).ok()?;
    let radius = n / 2;
    let index = match offset {
        0 => n - 1,
        1 => radius,
        k if k > 1 => radius.checked_add(k)?.checked_sub(1)?,
        k => radius.checked_add(k)?,
    };
    if (0..n).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

fn as_int(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::protocol::messages::{self, Envelope};

    fn state_json(tiles: &str) -> String {
        format!(r#"{{"mario":{{"x":40,"y":176}},"lives":2,"state":8,"tiles":{tiles}}}"#)
    }

    #[test]
    fn zero_offset_maps_to_last_row() {
        for side in [1usize, 3, 5, 13, 21] {
            assert_eq!(tile_row_index(0, side), Some(side - 1));
        }
    }

    #[test]
    fn offsets_within_radius_cover_every_row_once() {
        for side in [1usize, 3, 5, 7, 13] {
            let radius = (side / 2) as i64;
            let rows: HashSet<usize> = (-radius..=radius)
                .map(|k| tile_row_index(k, side).unwrap())
                .collect();
            assert_eq!(rows.len(), side);
            assert!(rows.iter().all(|&r| r < side));
        }
    }

    #[test]
    fn remap_of_a_three_by_three_view() {
        assert_eq!(tile_row_index(-1, 3), Some(0));
        assert_eq!(tile_row_index(1, 3), Some(1));
        assert_eq!(tile_row_index(0, 3), Some(2));
        assert_eq!(tile_row_index(2, 3), None);
        assert_eq!(tile_row_index(-2, 3), None);
    }

    #[test]
    fn tiles_are_placed_by_offset_not_by_key_order() {
        let json = state_json(r#"{"0":[7,8,9],"1":[4,5,6],"-1":[1,2,3]}"#);
        let state = parse_game_state(&json).unwrap();
        let expected = TileGrid::from_rows(&[vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]).unwrap();
        assert_eq!(state.tiles, expected);
        assert_eq!((state.mario_x, state.mario_y), (40, 176));
        assert_eq!(state.lives, 2);
        assert_eq!(state.player_state, 8);
        assert_eq!(state.coins, None);
    }

    #[test]
    fn short_rows_are_zero_padded() {
        let json = state_json(r#"{"-1":[1],"1":[],"0":[0,0,3]}"#);
        let state = parse_game_state(&json).unwrap();
        assert_eq!(state.tiles.row(0), Some(&[1, 0, 0][..]));
        assert_eq!(state.tiles.sum(), 4);
    }

    #[test]
    fn malformed_grids_are_rejected() {
        let even = state_json(r#"{"-1":[1,2],"1":[3,4]}"#);
        assert!(matches!(parse_game_state(&even), Err(ParseError::MalformedGrid(_))));

        let out_of_range = state_json(r#"{"-1":[0,0,0],"1":[0,0,0],"5":[0,0,0]}"#);
        assert!(matches!(parse_game_state(&out_of_range), Err(ParseError::MalformedGrid(_))));

        let collision = state_json(r#"{"-1":[0,0,0],"1":[0,0,0],"01":[0,0,0]}"#);
        assert!(matches!(parse_game_state(&collision), Err(ParseError::MalformedGrid(_))));

        let bad_key = state_json(r#"{"up":[0]}"#);
        assert!(matches!(parse_game_state(&bad_key), Err(ParseError::InvalidTileKey(_))));

        let wide = state_json(r#"{"0":[1,2]}"#);
        assert!(matches!(parse_game_state(&wide), Err(ParseError::MalformedGrid(_))));
    }

    #[test]
    fn extreme_row_offsets_are_rejected() {
        assert_eq!(tile_row_index(i64::MAX, 3), None);
        assert_eq!(tile_row_index(i64::MIN, 3), None);

        let high = state_json(r#"{"-1":[0,0,0],"1":[0,0,0],"9223372036854775807":[0,0,0]}"#);
        assert!(matches!(parse_game_state(&high), Err(ParseError::MalformedGrid(_))));

        let low = state_json(r#"{"-9223372036854775808":[0,0,0],"1":[0,0,0],"0":[0,0,0]}"#);
        assert!(matches!(parse_game_state(&low), Err(ParseError::MalformedGrid(_))));
    }

    #[test]
    fn oversized_grids_are_rejected_before_allocating() {
        let side = MAX_TILE_SIDE + 2;
        let radius = (side / 2) as i64;
        let rows: Vec<String> = (-radius..=radius).map(|k| format!("\"{k}\":[]")).collect();
        let json = state_json(&format!("{{{}}}", rows.join(",")));
        assert!(matches!(
            parse_game_state(&json),
            Err(ParseError::MalformedGrid(ref msg)) if msg.contains("at most")
        ));

        let side = MAX_TILE_SIDE;
        let radius = (side / 2) as i64;
        let rows: Vec<String> = (-radius..=radius).map(|k| format!("\"{k}\":[]")).collect();
        let json = state_json(&format!("{{{}}}", rows.join(",")));
        assert_eq!(parse_game_state(&json).unwrap().tiles.side(), MAX_TILE_SIDE);
    }

    #[test]
    fn missing_and_mistyped_fields() {
        let missing = r#"{"mario":{"x":1},"lives":2,"state":0,"tiles":{"0":[0]}}"#;
        assert!(matches!(
            parse_game_state(missing),
            Err(ParseError::MissingField(ref p)) if p == "mario.y"
        ));

        let mistyped = r#"{"mario":{"x":1,"y":2},"lives":"many","state":0,"tiles":{"0":[0]}}"#;
        assert!(matches!(
            parse_game_state(mistyped),
            Err(ParseError::WrongType { ref path, .. }) if path == "lives"
        ));

        assert!(matches!(parse_game_state("[1,2]"), Err(ParseError::NotAnObject)));
        assert!(matches!(parse_game_state("{\"mario\":"), Err(ParseError::Json(_))));
    }

    #[test]
    fn numeric_strings_and_coins_are_accepted() {
        let json =
            r#"{"mario":{"x":"12","y":3},"lives":1,"state":"11","coins":4,"tiles":{"0":["1"]}}"#;
        let state = parse_game_state(json).unwrap();
        assert_eq!(state.mario_x, 12);
        assert_eq!(state.player_state, 11);
        assert_eq!(state.coins, Some(4));
        assert_eq!(state.tiles.get(0, 0), Some(1));
    }

    #[test]
    fn endpoint_reply() {
        let endpoint =
            parse_endpoint(r#"{"endpoint":{"host":"192.168.0.4","port":"4561"}}"#).unwrap();
        assert_eq!(endpoint, Endpoint::new("192.168.0.4", "4561"));

        let numeric = parse_endpoint(r#"{"endpoint":{"host":"h","port":4561}}"#).unwrap();
        assert_eq!(numeric.port, "4561");

        assert!(matches!(
            parse_endpoint(r#"{"endpoint":{"host":"h"}}"#),
            Err(ParseError::MissingField(_))
        ));
    }

    #[test]
    fn every_command_survives_build_then_parse() {
        let mut commands: Vec<Command> = Key::ALL.into_iter().map(Command::Press).collect();
        commands.extend(
            [
                GameQuery::Tiles,
                GameQuery::Info,
                GameQuery::Reset,
                GameQuery::Image,
            ]
            .map(Command::Game),
        );
        commands.extend([
            Command::ConfigFrame(30),
            Command::ConfigImage(75),
            Command::ConfigDivisor(2),
            Command::ConfigSpeed(Speed::Normal),
            Command::ConfigSpeed(Speed::Maximum),
            Command::ConfigSpeed(Speed::Turbo),
            Command::GetEndpoint,
            Command::SendEndpoint(Endpoint::new("10.0.0.7", "5000")),
        ]);

        for command in commands {
            let parsed = Reply::parse(&command.message()).unwrap().commands().unwrap();
            assert_eq!(parsed, vec![command]);
        }
    }

    #[test]
    fn combined_envelope_parses_into_each_command() {
        let mut envelope = Envelope::new();
        envelope
            .append(&messages::config_frame(30))
            .append(&messages::press(Key::Down))
            .append(&messages::game_info());
        let mut parsed = Reply::parse(&envelope.wrap()).unwrap().commands().unwrap();
        parsed.sort_by_key(|c| format!("{c:?}"));
        assert_eq!(
            parsed,
            vec![
                Command::ConfigFrame(30),
                Command::Game(GameQuery::Info),
                Command::Press(Key::Down),
            ]
        );
    }

    #[test]
    fn unknown_commands_are_rejected() {
        let reply = Reply::parse(r#"{"key":{"value":"Select"}}"#).unwrap();
        assert!(matches!(reply.commands(), Err(ParseError::UnknownCommand(_))));
        let reply = Reply::parse(r#"{"warp":{"value":"4-1"}}"#).unwrap();
        assert!(matches!(reply.commands(), Err(ParseError::UnknownCommand(_))));
    }
}
