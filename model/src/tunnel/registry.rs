use super::target::local_url;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tabled::object::Segment;
use tabled::{Alignment, Modify, Style, Table, Tabled};

/// One entry of the externally consumed endpoint directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "STREAM URL")]
    pub stream_url: String,
}

impl RegistryEntry {
    /// An entry reachable at `http://localhost:<local_port>`.
    pub fn new<S>(id: S, local_port: u16) -> Self
    where
        S: Into<String>,
    {
        Self {
            id: id.into(),
            stream_url: local_url(local_port),
        }
    }
}

/// The ordered endpoint directory. Consumers use the position of an entry as a stable display
/// index, so entries keep the declared target order.
///
/// Serializes as a bare JSON array of `{"id", "streamUrl"}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRegistry {
    entries: Vec<RegistryEntry>,
}

impl SessionRegistry {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }
}

impl Display for SessionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new(self.entries.clone());
        table
            .with(Style::blank())
            .with(Modify::new(Segment::all()).with(Alignment::left()));
        Display::fmt(&table, f)
    }
}
