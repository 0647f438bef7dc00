// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


// Latest-value cache: most recent record per channel name.
// Entries are created on the first record of a channel and never removed.

use dashmap::DashMap;
use std::sync::Arc;

use crate::protocol::Record;

#[derive(Default)]
pub struct LatestValueCache {
    values: DashMap<String, Arc<Record>>,
}

impl LatestValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: &str) -> Option<Arc<Record>> {
        self.values.get(channel).map(|v| v.value().clone())
    }

    pub fn set(&self, record: Arc<Record>) {
        self.values.insert(record.name.clone(), record);
    }

    /// Number of channels observed so far
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
