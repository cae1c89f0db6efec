// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::traits::InstanceStore;
use crate::types::InstanceId;
use crate::workflow::WorkflowInstance;

/// Longest file stem written, leaving room for `.json.tmp` under the usual
/// 255-byte file name limit.
const MAX_FILE_STEM: usize = 200;

/// Keeps instances in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    instances: Mutex<HashMap<InstanceId, WorkflowInstance>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstanceStore for InMemoryStore {
    fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let mut instances = self.instances.lock().map_err(|_| StoreError::Poisoned)?;
        instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    fn load(&self, id: &InstanceId) -> Result<Option<WorkflowInstance>, StoreError> {
        let instances = self.instances.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(instances.get(id).cloned())
    }

    fn load_all(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let instances = self.instances.lock().map_err(|_| StoreError::Poisoned)?;
        let mut all: Vec<WorkflowInstance> = instances.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    fn remove(&self, id: &InstanceId) -> Result<(), StoreError> {
        let mut instances = self.instances.lock().map_err(|_| StoreError::Poisoned)?;
        instances.remove(id);
        Ok(())
    }
}

/// One JSON document per instance in a directory.
///
/// File names are the hex encoding of the instance id, so any business key is
/// a safe file name. Ids too long to fit a file name keep a hex prefix followed
/// by a name-based UUID of the whole id. Writes go to a temporary file that is
/// then renamed over the old record, so a crash never leaves a half-written
/// instance behind.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &InstanceId) -> PathBuf {
        let mut name: String = id.as_str().bytes().map(|b| format!("{:02x}", b)).collect();
        if name.len() > MAX_FILE_STEM {
            let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_str().as_bytes());
            name.truncate(MAX_FILE_STEM - 33);
            name = format!("{}-{}", name, digest.simple());
        }
        self.dir.join(format!("{}.json", name))
    }
}

impl InstanceStore for JsonFileStore {
    fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let path = self.path_for(&instance.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(instance)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, id: &InstanceId) -> Result<Option<WorkflowInstance>, StoreError> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn load_all(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            all.push(serde_json::from_slice::<WorkflowInstance>(&bytes)?);
        }
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    fn remove(&self, id: &InstanceId) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(id)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
