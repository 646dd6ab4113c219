use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::combat::unit::HeroId;
use crate::net::wire::{ChatMessage, EventId};

const MAX_PENDING_ECHOES: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub hero_id: HeroId,
    pub hero_name: String,
    pub text: String,
    pub timestamp_ms: i64,
    pub whisper: bool,
}

/// Client-local chat transcript, reconstructed from replayed chat events and
/// the polled transcript snapshot. Entries are deduplicated by event id or
/// by (hero, timestamp, text); echoes of the local hero's own just-sent
/// messages are filtered out, since they were already appended locally.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<ChatEntry>,
    applied_event_ids: BTreeSet<EventId>,
    seen_keys: HashSet<(HeroId, i64, String)>,
    pending_echoes: VecDeque<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends the local hero's own message immediately and remembers its
    /// text so the authority's echo of it is skipped later.
    pub fn append_local(&mut self, hero_id: HeroId, hero_name: &str, text: &str, timestamp_ms: i64) {
        self.entries.push(ChatEntry {
            hero_id,
            hero_name: hero_name.to_string(),
            text: text.to_string(),
            timestamp_ms,
            whisper: false,
        });
        self.seen_keys
            .insert((hero_id, timestamp_ms, text.to_string()));
        self.pending_echoes.push_back(text.to_string());
        while self.pending_echoes.len() > MAX_PENDING_ECHOES {
            self.pending_echoes.pop_front();
        }
    }

    /// Applies one replayed chat/whisper event. Returns true when a new
    /// entry was appended; duplicates by event id and local echoes return
    /// false and change nothing.
    pub fn apply_event(
        &mut self,
        event_id: EventId,
        hero_id: HeroId,
        hero_name: &str,
        text: &str,
        timestamp_ms: i64,
        whisper: bool,
        local_hero: HeroId,
    ) -> bool {
        if !self.applied_event_ids.insert(event_id) {
            return false;
        }
        if hero_id == local_hero && self.consume_echo(text) {
            return false;
        }
        let key = (hero_id, timestamp_ms, text.to_string());
        if !self.seen_keys.insert(key) {
            return false;
        }
        self.entries.push(ChatEntry {
            hero_id,
            hero_name: hero_name.to_string(),
            text: text.to_string(),
            timestamp_ms,
            whisper,
        });
        true
    }

    /// Merges the polled transcript snapshot. Returns how many entries were
    /// actually appended; re-applying the same snapshot appends nothing.
    pub fn sync_snapshot(&mut self, messages: &[ChatMessage], local_hero: HeroId) -> usize {
        let mut appended = 0usize;
        for message in messages {
            let key = (
                message.hero_id,
                message.timestamp_ms,
                message.text.clone(),
            );
            if self.seen_keys.contains(&key) {
                continue;
            }
            if message.hero_id == local_hero && self.consume_echo(&message.text) {
                self.seen_keys.insert(key);
                continue;
            }
            self.seen_keys.insert(key);
            self.entries.push(ChatEntry {
                hero_id: message.hero_id,
                hero_name: message.hero_name.clone(),
                text: message.text.clone(),
                timestamp_ms: message.timestamp_ms,
                whisper: false,
            });
            appended = appended.saturating_add(1);
        }
        appended
    }

    fn consume_echo(&mut self, text: &str) -> bool {
        match self.pending_echoes.iter().position(|entry| entry == text) {
            Some(index) => {
                self.pending_echoes.remove(index);
                true
            }
            None => false,
        }
    }
}
