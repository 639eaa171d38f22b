//! Enumerazioni - Tipi enumerati utilizzati nelle entità

use std::fmt;
use std::str::FromStr;

/// Tipo di messaggio di chat. Sul filo viaggia come stringa maiuscola;
/// il parsing fa anche da controllo di appartenenza per la validazione.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Join,
    Leave,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::Join => "JOIN",
            MessageType::Leave => "LEAVE",
        }
    }
}

impl FromStr for MessageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(MessageType::Text),
            "JOIN" => Ok(MessageType::Join),
            "LEAVE" => Ok(MessageType::Leave),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for raw in ["TEXT", "JOIN", "LEAVE"] {
            assert_eq!(raw.parse::<MessageType>().unwrap().as_str(), raw);
        }
    }

    #[test]
    fn test_rejects_unknown_and_lowercase() {
        assert!("text".parse::<MessageType>().is_err());
        assert!("PING".parse::<MessageType>().is_err());
        assert!("".parse::<MessageType>().is_err());
    }
}
