use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertStage {
    Fetch,
    Translate,
    Persist,
    Finalize,
}

impl ConvertStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Translate => "translate",
            Self::Persist => "persist",
            Self::Finalize => "finalize",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertEvent {
    pub stage: ConvertStage,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

/// Append-only event log for one conversion run; surfaced in the result so
/// callers (CLI, build endpoint) can show what happened without scraping
/// tracing output.
#[derive(Debug, Default)]
pub struct ConvertLog {
    events: Vec<ConvertEvent>,
}

impl ConvertLog {
    pub fn emit(&mut self, stage: ConvertStage, message: &str, details: BTreeMap<String, String>) {
        self.events.push(ConvertEvent {
            stage,
            message: message.to_string(),
            details,
        });
    }

    #[must_use]
    pub fn events(&self) -> &[ConvertEvent] {
        &self.events
    }
}
