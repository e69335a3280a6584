// Harbor Network Layer — Hosts
// Distributed under the MIT software license.

//! The rotating pool of candidate peer addresses.
//!
//! A bounded buffer of address items, unique by authority, with
//! reservation semantics: an entry handed to a session via `take` is not
//! offered again until restored or tainted. Eviction is oldest-first.
//!
//! Persistence is one authority per line, LF-separated; unparseable
//! lines are skipped on read and reserved entries are skipped on write.
//! All mutation goes through the pool strand owned by the network.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::authority::Authority;
use crate::config::settings::Settings;
use crate::config::now;
use crate::error::{Error, Result};
use crate::message::address::AddressItem;
use crate::runtime::strand::Strand;

/// Gossiped timestamps further in the future than this are discarded.
const MAX_FUTURE_SKEW_SECS: u64 = 600;

/// Strand-free pool state; [`HostPool`] serializes access.
pub struct Hosts {
    capacity: usize,
    pool: VecDeque<AddressItem>,
    reserved: HashSet<Authority>,
}

impl Hosts {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pool: VecDeque::with_capacity(capacity.max(1)),
            reserved: HashSet::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.pool.len()
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    /// Insert or refresh one entry, evicting the stalest unreserved entry
    /// when full.
    pub fn add(&mut self, item: AddressItem) -> bool {
        let authority = item.authority();

        if let Some(existing) = self
            .pool
            .iter_mut()
            .find(|entry| entry.authority() == authority)
        {
            // Timestamps are monotone within an entry's update stream.
            if item.timestamp >= existing.timestamp {
                existing.timestamp = item.timestamp;
                existing.services = item.services;
            }
            return false;
        }

        if self.pool.len() >= self.capacity && !self.evict() {
            return false;
        }

        self.pool.push_back(item);
        true
    }

    /// Drop the oldest unreserved entry; false when everything is reserved.
    fn evict(&mut self) -> bool {
        let stalest = self
            .pool
            .iter()
            .enumerate()
            .filter(|(_, entry)| !self.reserved.contains(&entry.authority()))
            .min_by_key(|(index, entry)| (entry.timestamp, *index))
            .map(|(index, _)| index);

        match stalest {
            Some(index) => {
                self.pool.remove(index);
                true
            }
            None => false,
        }
    }

    /// Reserve and return the most-recently-active unreserved entry.
    /// Ties break toward the lexicographically smaller authority.
    pub fn take(&mut self) -> Result<AddressItem> {
        let best = self
            .pool
            .iter()
            .filter(|entry| !self.reserved.contains(&entry.authority()))
            .max_by(|left, right| {
                left.timestamp
                    .cmp(&right.timestamp)
                    .then_with(|| right.authority().cmp(&left.authority()))
            })
            .copied()
            .ok_or(Error::AddressPoolEmpty)?;

        self.reserved.insert(best.authority());
        Ok(best)
    }

    /// Release a reservation after a successful dial; bumps freshness.
    pub fn restore(&mut self, item: AddressItem) {
        let authority = item.authority();
        self.reserved.remove(&authority);

        let refreshed = AddressItem { timestamp: now() as u32, ..item };
        if let Some(existing) = self
            .pool
            .iter_mut()
            .find(|entry| entry.authority() == authority)
        {
            existing.timestamp = refreshed.timestamp;
            existing.services = refreshed.services;
        } else {
            self.add(refreshed);
        }
    }

    /// Release a reservation after a failed dial and drop the entry.
    pub fn taint(&mut self, authority: &Authority) {
        self.reserved.remove(authority);
        self.pool.retain(|entry| entry.authority() != *authority);
    }

    /// Bulk gossip intake with filtering; returns the freshly accepted
    /// entries (updates to known entries are not reported).
    pub fn store(&mut self, items: &[AddressItem], settings: &Settings) -> Vec<AddressItem> {
        let horizon = now().saturating_add(MAX_FUTURE_SKEW_SECS) as u32;
        let mut accepted = Vec::new();

        for item in items {
            let authority = item.authority();

            if !authority.is_routable() {
                continue;
            }
            if settings.is_self(&authority) || settings.is_blocked(&authority) {
                continue;
            }
            if item.timestamp > horizon {
                continue;
            }
            if !item.has_services(settings.services_minimum) {
                continue;
            }
            // Service bits outside the permitted set mark a foreign or
            // confused network.
            if item.services & !settings.services_maximum != 0 {
                continue;
            }

            if self.add(*item) {
                accepted.push(*item);
            }
        }

        accepted
    }

    /// Random sample for gossip replies, freshest-weighted by shuffle
    /// only (callers cap the count).
    pub fn sample(&self, count: usize) -> Vec<AddressItem> {
        let mut entries: Vec<AddressItem> = self.pool.iter().copied().collect();
        let mut rng = ChaCha20Rng::from_entropy();
        entries.shuffle(&mut rng);
        entries.truncate(count);
        entries
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Read the hosts file, skipping unparseable lines.
    pub fn load(&mut self, path: &Path) -> usize {
        let Ok(text) = std::fs::read_to_string(path) else {
            return 0;
        };

        let timestamp = now() as u32;
        let mut loaded = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match line.parse::<Authority>() {
                Ok(authority) => {
                    if self.add(AddressItem::new(authority, timestamp, 0)) {
                        loaded += 1;
                    }
                }
                Err(_) => tracing::debug!("skipping malformed hosts line: {}", line),
            }
        }

        loaded
    }

    /// Write the pool (minus reservations) atomically: temp file, rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let temp = path.with_extension("tmp");

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&temp)?;
            for entry in &self.pool {
                let authority = entry.authority();
                if self.reserved.contains(&authority) {
                    continue;
                }
                writeln!(file, "{}", authority)?;
            }
            file.sync_all()?;
            std::fs::rename(&temp, path)
        };

        write().map_err(|error| {
            tracing::warn!("hosts save to {} failed: {}", path.display(), error);
            Error::ResourceExhausted
        })
    }
}

/// The strand-serialized pool the rest of the stack talks to.
pub struct HostPool {
    strand: Strand,
    settings: Arc<Settings>,
    state: Arc<Mutex<Hosts>>,
}

impl HostPool {
    pub fn new(strand: Strand, settings: Arc<Settings>) -> Arc<Self> {
        let state = Arc::new(Mutex::new(Hosts::new(settings.host_pool_capacity as usize)));
        Arc::new(Self { strand, settings, state })
    }

    async fn run<R: Send + 'static>(
        &self,
        operation: impl FnOnce(&mut Hosts) -> R + Send + 'static,
    ) -> Result<R> {
        let state = Arc::clone(&self.state);
        self.strand
            .run(move || operation(&mut state.lock().unwrap()))
            .await
    }

    pub async fn take(&self) -> Result<AddressItem> {
        self.run(|hosts| hosts.take()).await?
    }

    pub async fn restore(&self, item: AddressItem) {
        let _ = self.run(move |hosts| hosts.restore(item)).await;
    }

    pub async fn taint(&self, authority: Authority) {
        let _ = self.run(move |hosts| hosts.taint(&authority)).await;
    }

    pub async fn store(&self, items: Vec<AddressItem>) -> Vec<AddressItem> {
        let settings = Arc::clone(&self.settings);
        self.run(move |hosts| hosts.store(&items, &settings))
            .await
            .unwrap_or_default()
    }

    pub async fn sample(&self, count: usize) -> Vec<AddressItem> {
        self.run(move |hosts| hosts.sample(count))
            .await
            .unwrap_or_default()
    }

    pub async fn count(&self) -> usize {
        self.run(|hosts| hosts.count()).await.unwrap_or(0)
    }

    pub async fn reserved_count(&self) -> usize {
        self.run(|hosts| hosts.reserved_count()).await.unwrap_or(0)
    }

    pub async fn load(&self) -> usize {
        let path = self.settings.host_file_path.clone();
        self.run(move |hosts| hosts.load(&path)).await.unwrap_or(0)
    }

    pub async fn save(&self) -> Result<()> {
        let path = self.settings.host_file_path.clone();
        self.run(move |hosts| hosts.save(&path)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::address::NODE_NETWORK;

    fn item(text: &str, timestamp: u32) -> AddressItem {
        AddressItem::new(text.parse().unwrap(), timestamp, NODE_NETWORK)
    }

    #[test]
    fn test_no_duplicate_authorities() {
        let mut hosts = Hosts::new(8);
        assert!(hosts.add(item("8.8.8.8:8333", 100)));
        assert!(!hosts.add(item("8.8.8.8:8333", 200)), "update, not insert");
        assert_eq!(hosts.count(), 1);

        // The refresh took the newer timestamp.
        let taken = hosts.take().unwrap();
        assert_eq!(taken.timestamp, 200);
    }

    #[test]
    fn test_stale_update_ignored() {
        let mut hosts = Hosts::new(8);
        hosts.add(item("8.8.8.8:8333", 200));
        hosts.add(item("8.8.8.8:8333", 100));
        assert_eq!(hosts.take().unwrap().timestamp, 200);
    }

    #[test]
    fn test_eviction_drops_stalest() {
        // Capacity 3: A,B,C then D evicts A; take() returns freshest (D).
        let mut hosts = Hosts::new(3);
        hosts.add(item("1.1.1.1:8333", 10)); // A
        hosts.add(item("2.2.2.2:8333", 20)); // B
        hosts.add(item("3.3.3.3:8333", 30)); // C
        hosts.add(item("4.4.4.4:8333", 40)); // D

        assert_eq!(hosts.count(), 3);
        let remaining: Vec<String> = hosts
            .pool
            .iter()
            .map(|entry| entry.authority().to_string())
            .collect();
        assert_eq!(remaining, vec!["2.2.2.2:8333", "3.3.3.3:8333", "4.4.4.4:8333"]);

        assert_eq!(hosts.take().unwrap().authority().to_string(), "4.4.4.4:8333");
    }

    #[test]
    fn test_reservation_excludes_from_take_and_eviction() {
        let mut hosts = Hosts::new(2);
        hosts.add(item("1.1.1.1:8333", 10));
        hosts.add(item("2.2.2.2:8333", 20));

        let first = hosts.take().unwrap();
        assert_eq!(first.authority().to_string(), "2.2.2.2:8333");
        let second = hosts.take().unwrap();
        assert_eq!(second.authority().to_string(), "1.1.1.1:8333");
        assert!(hosts.take().is_err(), "everything reserved");

        // Reserved entries survive eviction pressure.
        assert!(!hosts.add(item("3.3.3.3:8333", 30)));
        assert_eq!(hosts.count(), 2);

        hosts.restore(first);
        assert_eq!(hosts.take().unwrap().authority().to_string(), "2.2.2.2:8333");
    }

    #[test]
    fn test_take_tie_breaks_lexicographic() {
        let mut hosts = Hosts::new(4);
        hosts.add(item("9.9.9.9:8333", 50));
        hosts.add(item("1.1.1.1:8333", 50));

        assert_eq!(hosts.take().unwrap().authority().to_string(), "1.1.1.1:8333");
    }

    #[test]
    fn test_taint_removes_entry() {
        let mut hosts = Hosts::new(4);
        hosts.add(item("1.1.1.1:8333", 10));
        let taken = hosts.take().unwrap();

        hosts.taint(&taken.authority());
        assert_eq!(hosts.count(), 0);
        assert_eq!(hosts.reserved_count(), 0);
    }

    #[test]
    fn test_store_filters() {
        let mut settings = Settings::default();
        settings.blocked.push("5.5.0.0:0/16".parse().unwrap());
        settings.selfs.push("6.6.6.6:8333".parse().unwrap());
        let mut hosts = Hosts::new(16);

        let future = (now() + 7200) as u32;
        let accepted = hosts.store(
            &[
                item("8.8.8.8:8333", 100),            // kept
                item("192.168.0.1:8333", 100),        // unroutable
                item("5.5.1.2:8333", 100),            // blocked subnet
                item("6.6.6.6:8333", 100),            // self
                item("9.9.9.9:8333", future),         // future timestamp
                AddressItem::new("7.7.7.7:8333".parse().unwrap(), 100, 0), // no services
            ],
            &settings,
        );

        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].authority().to_string(), "8.8.8.8:8333");
        assert_eq!(hosts.count(), 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!("harbor_hosts_{}", std::process::id()));

        let mut hosts = Hosts::new(8);
        hosts.add(item("8.8.8.8:8333", 100));
        hosts.add(item("[2001:4860::8888]:8333", 200));
        let reserved = hosts.take().unwrap();
        hosts.save(&path).unwrap();

        // The reserved entry is excluded from the file.
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(!text.contains(&reserved.authority().to_string()));

        let mut reloaded = Hosts::new(8);
        // Malformed lines are skipped.
        std::fs::write(&path, format!("{}garbage line\n", text)).unwrap();
        assert_eq!(reloaded.load(&path), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_sample_bounded() {
        let mut hosts = Hosts::new(32);
        for index in 1..=20u8 {
            hosts.add(item(&format!("8.8.{}.1:8333", index), u32::from(index)));
        }

        assert_eq!(hosts.sample(5).len(), 5);
        assert_eq!(hosts.sample(50).len(), 20);
    }
}
