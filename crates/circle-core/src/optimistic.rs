//! Optimistic local state.
//!
//! A screen applies its own mutations to an `OptimisticList` before the
//! backend answers, then reconciles: the server copy replaces the local one,
//! or the local one is rolled back. Realtime pushes go through the same list
//! so a row the user just created never shows up twice.

use std::future::Future;

use uuid::Uuid;

use circle_types::models::{Message, Reaction, Submission};

/// Records that can be created tentatively and later matched to their
/// server copy.
pub trait Tentative: Clone {
    type Key: PartialEq;

    /// Server id. Meaningless while the record is pending.
    fn id(&self) -> Uuid;

    /// Natural key used to recognise the server copy of a pending record
    /// when it arrives over realtime before the request returns.
    fn key(&self) -> Self::Key;
}

impl Tentative for Message {
    type Key = (Uuid, Uuid, String);

    fn id(&self) -> Uuid {
        self.id
    }

    fn key(&self) -> Self::Key {
        (self.group_id, self.user_id, self.message_text.clone())
    }
}

impl Tentative for Reaction {
    type Key = (Uuid, Uuid, String);

    fn id(&self) -> Uuid {
        self.id
    }

    fn key(&self) -> Self::Key {
        (self.message_id, self.user_id, self.emoji.clone())
    }
}

impl Tentative for Submission {
    type Key = (Uuid, Uuid);

    fn id(&self) -> Uuid {
        self.id
    }

    fn key(&self) -> Self::Key {
        (self.user_id, self.prompt_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(u64);

#[derive(Debug, Clone)]
enum Slot<T> {
    Pending(TempId, T),
    Confirmed(T),
}

impl<T> Slot<T> {
    fn record(&self) -> &T {
        match self {
            Slot::Pending(_, r) | Slot::Confirmed(r) => r,
        }
    }

    fn into_record(self) -> T {
        match self {
            Slot::Pending(_, r) | Slot::Confirmed(r) => r,
        }
    }
}

/// A confirmed record taken out of the list, remembering where it was.
#[derive(Debug, Clone)]
pub struct Removed<T> {
    index: usize,
    record: T,
}

impl<T> Removed<T> {
    pub fn record(&self) -> &T {
        &self.record
    }
}

#[derive(Debug, Clone)]
pub struct OptimisticList<T> {
    slots: Vec<Slot<T>>,
    next_temp: u64,
}

impl<T: Tentative> Default for OptimisticList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Tentative> OptimisticList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_temp: 0,
        }
    }

    pub fn from_confirmed(records: impl IntoIterator<Item = T>) -> Self {
        Self {
            slots: records.into_iter().map(Slot::Confirmed).collect(),
            next_temp: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every record, pending or confirmed, in display order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().map(Slot::record)
    }

    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Pending(..)))
            .count()
    }

    pub fn is_pending(&self, temp: TempId) -> bool {
        self.pending_index(temp).is_some()
    }

    /// A confirmed record by server id.
    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.confirmed_index(id).map(|i| self.slots[i].record())
    }

    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.iter().find(|r| pred(r))
    }

    pub fn push_pending(&mut self, record: T) -> TempId {
        let temp = TempId(self.next_temp);
        self.next_temp += 1;
        self.slots.push(Slot::Pending(temp, record));
        temp
    }

    /// Swap a pending record for the server's copy.
    pub fn confirm(&mut self, temp: TempId, record: T) {
        let Some(pending) = self.pending_index(temp) else {
            self.upsert(record);
            return;
        };
        match self.confirmed_index(record.id()) {
            Some(existing) => {
                self.slots[existing] = Slot::Confirmed(record);
                self.slots.remove(pending);
            }
            None => self.slots[pending] = Slot::Confirmed(record),
        }
    }

    pub fn rollback(&mut self, temp: TempId) -> Option<T> {
        let index = self.pending_index(temp)?;
        Some(self.slots.remove(index).into_record())
    }

    /// Apply a record pushed by the backend (insert or update).
    pub fn apply_insert(&mut self, record: T) {
        if let Some(i) = self.confirmed_index(record.id()) {
            self.slots[i] = Slot::Confirmed(record);
            return;
        }
        let key = record.key();
        let pending = self
            .slots
            .iter()
            .position(|s| matches!(s, Slot::Pending(_, r) if r.key() == key));
        match pending {
            Some(i) => self.slots[i] = Slot::Confirmed(record),
            None => self.slots.push(Slot::Confirmed(record)),
        }
    }

    pub fn apply_delete(&mut self, id: Uuid) -> Option<T> {
        let index = self.confirmed_index(id)?;
        Some(self.slots.remove(index).into_record())
    }

    /// Take a confirmed record out for an optimistic delete.
    pub fn remove(&mut self, id: Uuid) -> Option<Removed<T>> {
        let index = self.confirmed_index(id)?;
        let record = self.slots.remove(index).into_record();
        Some(Removed { index, record })
    }

    /// Undo `remove`. A record that came back over realtime meanwhile is kept.
    pub fn restore(&mut self, removed: Removed<T>) {
        if self.confirmed_index(removed.record.id()).is_some() {
            return;
        }
        let index = removed.index.min(self.slots.len());
        self.slots.insert(index, Slot::Confirmed(removed.record));
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.slots.retain(|s| keep(s.record()));
    }

    fn upsert(&mut self, record: T) {
        match self.confirmed_index(record.id()) {
            Some(i) => self.slots[i] = Slot::Confirmed(record),
            None => self.slots.push(Slot::Confirmed(record)),
        }
    }

    fn pending_index(&self, temp: TempId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Slot::Pending(t, _) if *t == temp))
    }

    fn confirmed_index(&self, id: Uuid) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Slot::Confirmed(r) if r.id() == id))
    }
}

/// Show `local` immediately, run `request`, then reconcile.
pub async fn mutate<T, E, F>(list: &mut OptimisticList<T>, local: T, request: F) -> Result<T, E>
where
    T: Tentative,
    F: Future<Output = Result<T, E>>,
{
    let temp = list.push_pending(local);
    match request.await {
        Ok(stored) => {
            list.confirm(temp, stored.clone());
            Ok(stored)
        }
        Err(e) => {
            list.rollback(temp);
            Err(e)
        }
    }
}
