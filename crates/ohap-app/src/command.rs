//! Commands that drive a running [`Engine`](crate::Engine)
//!
//! Commands are queued on the engine's command channel and handled between
//! connection events, so callers on other tasks never touch the tree.
//! Headless mode parses them from stdin lines like `set 5 on` or `listen 1`.

use std::str::FromStr;

use ohap_core::item::ItemId;
use ohap_core::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    StartListening(ItemId),
    StopListening(ItemId),
    SetBinary { id: ItemId, value: bool },
    SetDecimal { id: ItemId, value: f64 },
    Ping,
    SetUrl(String),
    /// Stop, then start again with the same observer
    Reconnect,
    Quit,
}

impl FromStr for EngineCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(Error::config("empty command"));
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb, args.as_slice()) {
            ("listen", [id]) => EngineCommand::StartListening(parse_id(id)?),
            ("unlisten", [id]) => EngineCommand::StopListening(parse_id(id)?),
            ("set", [id, value]) => {
                let id = parse_id(id)?;
                match *value {
                    "on" | "true" => EngineCommand::SetBinary { id, value: true },
                    "off" | "false" => EngineCommand::SetBinary { id, value: false },
                    other => EngineCommand::SetDecimal {
                        id,
                        value: other
                            .parse()
                            .map_err(|_| Error::config(format!("invalid value: {other}")))?,
                    },
                }
            }
            ("ping", []) => EngineCommand::Ping,
            ("url", [url]) => EngineCommand::SetUrl(url.to_string()),
            ("reconnect", []) => EngineCommand::Reconnect,
            ("quit" | "q", []) => EngineCommand::Quit,
            _ => return Err(Error::config(format!("unknown command: {}", line.trim()))),
        };
        Ok(command)
    }
}

fn parse_id(word: &str) -> Result<ItemId> {
    word.parse()
        .map_err(|_| Error::config(format!("invalid item id: {word}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "listen 1".parse::<EngineCommand>().unwrap(),
            EngineCommand::StartListening(1)
        );
        assert_eq!(
            "  unlisten   0 ".parse::<EngineCommand>().unwrap(),
            EngineCommand::StopListening(0)
        );
        assert_eq!(
            "set 5 on".parse::<EngineCommand>().unwrap(),
            EngineCommand::SetBinary { id: 5, value: true }
        );
        assert_eq!(
            "set 6 21.5".parse::<EngineCommand>().unwrap(),
            EngineCommand::SetDecimal { id: 6, value: 21.5 }
        );
        assert_eq!(
            "url http://10.0.0.2:18000/".parse::<EngineCommand>().unwrap(),
            EngineCommand::SetUrl("http://10.0.0.2:18000/".to_string())
        );
        assert_eq!("q".parse::<EngineCommand>().unwrap(), EngineCommand::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<EngineCommand>().is_err());
        assert!("listen".parse::<EngineCommand>().is_err());
        assert!("listen x".parse::<EngineCommand>().is_err());
        assert!("set 5 maybe".parse::<EngineCommand>().is_err());
        assert!("dance".parse::<EngineCommand>().is_err());
    }
}
