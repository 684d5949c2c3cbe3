//! Platform-specific option defaults
//!
//! Each option family has its own rule; all of them pick a starting value
//! from the same precedence chain (override, saved variant, request-level)
//! and then apply their family's defaulting.

use tracing::debug;

use crate::config::PinterestConfig;
use crate::options::{
    BoardOptions, OptionKind, OptionsSet, PlatformOptions, ThreadOptions, TitleOptions,
};

/// Content longer than this is posted as a thread unless told otherwise
pub const THREAD_THRESHOLD_CHARS: usize = 280;

/// Maximum length of a title derived from the content
pub const MAX_DERIVED_TITLE_CHARS: usize = 300;

/// Title used when nothing else is available
pub const FALLBACK_TITLE: &str = "Post";

/// Option sources for one platform, highest precedence first
#[derive(Debug, Clone, Copy)]
pub struct OptionSources<'a> {
    pub override_: Option<&'a OptionsSet>,
    pub saved: Option<&'a OptionsSet>,
    pub request: &'a OptionsSet,
}

impl<'a> OptionSources<'a> {
    /// Only request-level options, as for grouped platforms
    pub fn request_only(request: &'a OptionsSet) -> Self {
        Self {
            override_: None,
            saved: None,
            request,
        }
    }

    fn first(&self, kind: OptionKind) -> Option<PlatformOptions> {
        [self.override_, self.saved, Some(self.request)]
            .into_iter()
            .flatten()
            .find_map(|set| set.get(kind))
    }
}

/// Resolves platform options for one option family
#[derive(Debug, Clone, Default)]
pub struct PlatformOptionsResolver {
    default_board: Option<BoardOptions>,
}

impl PlatformOptionsResolver {
    pub fn new(default_board: Option<BoardOptions>) -> Self {
        Self { default_board }
    }

    pub fn from_config(config: Option<&PinterestConfig>) -> Self {
        let default_board = config.and_then(|cfg| {
            let board = BoardOptions {
                board_id: cfg.default_board_id.clone(),
                board_name: cfg.default_board_name.clone(),
                ..Default::default()
            };
            board.has_board().then_some(board)
        });
        Self::new(default_board)
    }

    /// Resolve options of `kind` for a post whose effective text is `content`.
    ///
    /// Returns `None` when the family yields no options at all.
    pub fn resolve(
        &self,
        kind: OptionKind,
        sources: OptionSources<'_>,
        request_title: Option<&str>,
        content: &str,
    ) -> Option<PlatformOptions> {
        match kind {
            OptionKind::Thread => resolve_thread(sources, content).map(PlatformOptions::Thread),
            OptionKind::Title => Some(PlatformOptions::Title(resolve_title(
                sources,
                request_title,
                content,
            ))),
            OptionKind::Board => self.resolve_board(sources).map(PlatformOptions::Board),
        }
    }

    fn resolve_board(&self, sources: OptionSources<'_>) -> Option<BoardOptions> {
        let chosen = match sources.first(OptionKind::Board) {
            Some(PlatformOptions::Board(board)) => Some(board),
            _ => None,
        };

        let board = match (chosen, &self.default_board) {
            (Some(mut board), Some(default)) if !board.has_board() => {
                board.board_id = default.board_id.clone();
                board.board_name = default.board_name.clone();
                Some(board)
            }
            (Some(board), _) => Some(board),
            (None, Some(default)) => {
                debug!("Using configured default Pinterest board");
                Some(default.clone())
            }
            (None, None) => None,
        };

        board.map(normalize_board)
    }
}

fn resolve_thread(sources: OptionSources<'_>, content: &str) -> Option<ThreadOptions> {
    if let Some(PlatformOptions::Thread(options)) = sources.first(OptionKind::Thread) {
        return Some(options);
    }
    if content.chars().count() > THREAD_THRESHOLD_CHARS {
        debug!("Content exceeds {} characters, posting as thread", THREAD_THRESHOLD_CHARS);
        return Some(ThreadOptions::numbered_thread());
    }
    None
}

fn resolve_title(
    sources: OptionSources<'_>,
    request_title: Option<&str>,
    content: &str,
) -> TitleOptions {
    let mut options = match sources.first(OptionKind::Title) {
        Some(PlatformOptions::Title(options)) => options,
        _ => TitleOptions::default(),
    };

    if !options.has_title_or_target() {
        options.title = Some(derive_title(request_title, content));
    }
    options
}

/// Request title, else the content's first line, else `"Post"`
pub fn derive_title(request_title: Option<&str>, content: &str) -> String {
    if let Some(title) = request_title.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }

    let first_line = content.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    first_line.chars().take(MAX_DERIVED_TITLE_CHARS).collect()
}

/// Board ids must be numeric; anything else is a board name.
///
/// A non-numeric id moves into `board_name` and the id is cleared. If a
/// name is already set and it is qualified (`owner/board`) while the moved
/// value is not, the existing name is kept.
pub fn normalize_board(mut options: BoardOptions) -> BoardOptions {
    let Some(id) = options.board_id.take() else {
        return options;
    };
    let id = id.trim().to_string();
    if id.is_empty() {
        return options;
    }
    if id.chars().all(|c| c.is_ascii_digit()) {
        options.board_id = Some(id);
        return options;
    }

    let keep_existing = options
        .board_name
        .as_deref()
        .is_some_and(|name| name.contains('/'))
        && !id.contains('/');

    if keep_existing {
        debug!("Ignoring non-numeric board id '{}', qualified board name already set", id);
    } else {
        options.board_name = Some(id);
    }
    options
}
