use std::collections::HashMap;

use parking_lot::RwLock;

use crate::adaptive::modeling::ProficiencyNetwork;
use crate::adaptive::types::{PerformanceRecord, UserProfile};
use crate::storage::{ModelStore, ProfileStore, StorageResult};

type TopicKey = (String, String);

fn key(user_id: &str, topic: &str) -> TopicKey {
    (user_id.to_string(), topic.to_string())
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    /// user_id -> (insertion sequence, profile)
    profiles: RwLock<HashMap<String, (u64, UserProfile)>>,
    next_seq: RwLock<u64>,
    models: RwLock<HashMap<TopicKey, ProficiencyNetwork>>,
    histories: RwLock<HashMap<TopicKey, Vec<PerformanceRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryStore {
    fn load_profile(&self, user_id: &str) -> StorageResult<Option<UserProfile>> {
        Ok(self
            .profiles
            .read()
            .get(user_id)
            .map(|(_, profile)| profile.clone()))
    }

    fn save_profile(&self, profile: &UserProfile) -> StorageResult<()> {
        let mut profiles = self.profiles.write();
        if let Some(entry) = profiles.get_mut(&profile.user_id) {
            entry.1 = profile.clone();
            return Ok(());
        }
        let seq = {
            let mut next = self.next_seq.write();
            let seq = *next;
            *next += 1;
            seq
        };
        profiles.insert(profile.user_id.clone(), (seq, profile.clone()));
        Ok(())
    }

    fn list_profiles(&self) -> StorageResult<Vec<UserProfile>> {
        let profiles = self.profiles.read();
        let mut ordered: Vec<&(u64, UserProfile)> = profiles.values().collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        Ok(ordered.into_iter().map(|(_, p)| p.clone()).collect())
    }

    fn profile_count(&self) -> StorageResult<usize> {
        Ok(self.profiles.read().len())
    }
}

impl ModelStore for InMemoryStore {
    fn load_model(&self, user_id: &str, topic: &str) -> StorageResult<Option<ProficiencyNetwork>> {
        Ok(self.models.read().get(&key(user_id, topic)).cloned())
    }

    fn save_model(
        &self,
        user_id: &str,
        topic: &str,
        model: &ProficiencyNetwork,
    ) -> StorageResult<()> {
        self.models.write().insert(key(user_id, topic), model.clone());
        Ok(())
    }

    fn load_history(&self, user_id: &str, topic: &str) -> StorageResult<Vec<PerformanceRecord>> {
        Ok(self
            .histories
            .read()
            .get(&key(user_id, topic))
            .cloned()
            .unwrap_or_default())
    }

    fn append_history(
        &self,
        user_id: &str,
        topic: &str,
        record: &PerformanceRecord,
    ) -> StorageResult<Vec<PerformanceRecord>> {
        let mut histories = self.histories.write();
        let history = histories.entry(key(user_id, topic)).or_default();
        history.push(record.clone());
        Ok(history.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::types::{BackgroundInfo, DifficultyLevel};
    use chrono::Utc;

    fn profile(user_id: &str) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            background: BackgroundInfo::default(),
            base_difficulty: DifficultyLevel::Intermediate,
            relevant_domains: Default::default(),
            domain_difficulties: Default::default(),
            recommendations: vec![],
            profile_confidence: 0.6,
            quiz_history: vec![],
        }
    }

    #[test]
    fn list_keeps_first_insertion_order_on_overwrite() {
        let store = InMemoryStore::new();
        for id in ["c", "a", "b"] {
            store.save_profile(&profile(id)).unwrap();
        }
        let mut updated = profile("c");
        updated.profile_confidence = 0.9;
        store.save_profile(&updated).unwrap();

        let ids: Vec<String> = store
            .list_profiles()
            .unwrap()
            .into_iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(store.profile_count().unwrap(), 3);
        assert_eq!(store.load_profile("c").unwrap().unwrap().profile_confidence, 0.9);
    }

    #[test]
    fn history_is_scoped_per_topic() {
        let store = InMemoryStore::new();
        let record = PerformanceRecord::default();
        store.append_history("u1", "algebra", &record).unwrap();
        let history = store.append_history("u1", "algebra", &record).unwrap();
        assert_eq!(history.len(), 2);
        assert!(store.load_history("u1", "physics").unwrap().is_empty());
    }
}
