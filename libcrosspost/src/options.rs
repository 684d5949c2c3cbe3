//! Typed platform options
//!
//! The gateway accepts a loosely typed options object per platform family
//! (`twitterOptions`, `redditOptions`, `pinterestOptions`). Each family is a
//! struct here with the fields the composer reasons about; anything else the
//! caller sends is carried through untouched in `extra`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Option family, one per rule set of the options resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionKind {
    /// Thread-capable platforms (X)
    Thread,
    /// Platforms that need a title (Reddit)
    Title,
    /// Platforms that post onto a board (Pinterest)
    Board,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_number: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadOptions {
    /// Long-form content split into a numbered thread
    pub fn numbered_thread() -> Self {
        Self {
            thread: Some(true),
            thread_number: Some(true),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TitleOptions {
    pub fn has_title_or_target(&self) -> bool {
        is_set(&self.title) || is_set(&self.subreddit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardOptions {
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BoardOptions {
    pub fn has_board(&self) -> bool {
        is_set(&self.board_id) || is_set(&self.board_name)
    }
}

/// Options of one family
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformOptions {
    Thread(ThreadOptions),
    Title(TitleOptions),
    Board(BoardOptions),
}

/// At most one options value per family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_options: Option<ThreadOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reddit_options: Option<TitleOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinterest_options: Option<BoardOptions>,
}

impl OptionsSet {
    pub fn get(&self, kind: OptionKind) -> Option<PlatformOptions> {
        match kind {
            OptionKind::Thread => self.twitter_options.clone().map(PlatformOptions::Thread),
            OptionKind::Title => self.reddit_options.clone().map(PlatformOptions::Title),
            OptionKind::Board => self.pinterest_options.clone().map(PlatformOptions::Board),
        }
    }

    /// Set the value for the option's family, replacing any previous one
    pub fn insert(&mut self, options: PlatformOptions) {
        match options {
            PlatformOptions::Thread(o) => self.twitter_options = Some(o),
            PlatformOptions::Title(o) => self.reddit_options = Some(o),
            PlatformOptions::Board(o) => self.pinterest_options = Some(o),
        }
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Board ids arrive both as JSON strings and as bare numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number for boardId, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_set_wire_names() {
        let mut set = OptionsSet::default();
        set.insert(PlatformOptions::Thread(ThreadOptions::numbered_thread()));
        set.insert(PlatformOptions::Title(TitleOptions {
            title: Some("Launch".to_string()),
            ..Default::default()
        }));

        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(
            value,
            json!({
                "twitterOptions": {"thread": true, "threadNumber": true},
                "redditOptions": {"title": "Launch"}
            })
        );
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let options: TitleOptions =
            serde_json::from_value(json!({"subreddit": "rust", "flairId": "abc"})).unwrap();
        assert_eq!(options.subreddit.as_deref(), Some("rust"));
        assert_eq!(options.extra.get("flairId"), Some(&json!("abc")));

        let back = serde_json::to_value(&options).unwrap();
        assert_eq!(back, json!({"subreddit": "rust", "flairId": "abc"}));
    }

    #[test]
    fn test_board_id_accepts_numbers() {
        let options: BoardOptions = serde_json::from_value(json!({"boardId": 12345})).unwrap();
        assert_eq!(options.board_id.as_deref(), Some("12345"));

        let options: BoardOptions = serde_json::from_value(json!({"boardId": "my-board"})).unwrap();
        assert_eq!(options.board_id.as_deref(), Some("my-board"));

        let options: BoardOptions = serde_json::from_value(json!({})).unwrap();
        assert!(options.board_id.is_none());
    }

    #[test]
    fn test_title_presence_ignores_blank() {
        let options = TitleOptions {
            title: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!options.has_title_or_target());
    }
}
