// Copyright 2025 CineMetric Contributors
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

//! Append-only evaluation result log.
//!
//! Simple framed format: magic + version header, then length-prefixed JSON
//! entries each followed by a crc32 trailer. Entries that fail the CRC
//! check are skipped with a warning rather than poisoning the whole log.
//! No in-memory cache; reads re-scan the file and rely on the OS page
//! cache. `compact` rewrites the log dropping corrupt frames.

use crate::{ResultFilter, ResultStore, StoreError};
use cinemetric_core::EvaluationResult;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const RESULT_LOG_MAGIC: &[u8; 4] = b"CNMT";
const RESULT_LOG_VERSION: u32 = 1;

/// File-backed [`ResultStore`].
pub struct ResultLog {
    data_dir: PathBuf,
    log_path: PathBuf,
    // Serializes appends; readers never hold it.
    write_lock: Mutex<()>,
}

impl ResultLog {
    /// Open or create a result log under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let log_path = data_dir.join("results.log");
        if !log_path.exists() {
            let mut file = File::create(&log_path)?;
            file.write_all(RESULT_LOG_MAGIC)?;
            file.write_all(&RESULT_LOG_VERSION.to_le_bytes())?;
            file.flush()?;
        }

        Ok(Self {
            data_dir,
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    fn load(&self) -> Result<Vec<EvaluationResult>, StoreError> {
        let mut results = Vec::new();

        let file = File::open(&self.log_path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        if reader.read_exact(&mut magic).is_err() {
            return Ok(results); // empty file
        }
        if &magic != RESULT_LOG_MAGIC {
            tracing::warn!("invalid result log magic, treating log as empty");
            return Ok(results);
        }

        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != RESULT_LOG_VERSION {
            tracing::warn!(
                "result log version mismatch ({} vs {}), treating log as empty",
                version,
                RESULT_LOG_VERSION
            );
            return Ok(results);
        }

        loop {
            let mut len_bytes = [0u8; 4];
            if reader.read_exact(&mut len_bytes).is_err() {
                break; // EOF
            }
            let len = u32::from_le_bytes(len_bytes) as usize;

            let mut data = vec![0u8; len];
            if reader.read_exact(&mut data).is_err() {
                tracing::warn!("truncated entry at end of result log");
                break;
            }

            let mut crc_bytes = [0u8; 4];
            if reader.read_exact(&mut crc_bytes).is_err() {
                tracing::warn!("truncated CRC at end of result log");
                break;
            }
            let stored_crc = u32::from_le_bytes(crc_bytes);
            if stored_crc != crc32fast::hash(&data) {
                tracing::warn!("CRC mismatch in result log, skipping entry");
                continue;
            }

            match serde_json::from_slice::<EvaluationResult>(&data) {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!("undecodable result log entry, skipping: {e}"),
            }
        }

        Ok(results)
    }

    fn append_frames(path: &Path, results: &[&EvaluationResult]) -> Result<(), StoreError> {
        let file = OpenOptions::new().append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for result in results {
            let data = serde_json::to_vec(result)?;
            let crc = crc32fast::hash(&data);
            writer.write_all(&(data.len() as u32).to_le_bytes())?;
            writer.write_all(&data)?;
            writer.write_all(&crc.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Rewrite the log keeping only decodable entries.
    pub fn compact(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let results = self.load()?;

        let new_path = self.data_dir.join("results.log.new");
        {
            let file = File::create(&new_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(RESULT_LOG_MAGIC)?;
            writer.write_all(&RESULT_LOG_VERSION.to_le_bytes())?;
            for result in &results {
                let data = serde_json::to_vec(result)?;
                let crc = crc32fast::hash(&data);
                writer.write_all(&(data.len() as u32).to_le_bytes())?;
                writer.write_all(&data)?;
                writer.write_all(&crc.to_le_bytes())?;
            }
            writer.flush()?;
        }
        std::fs::rename(&new_path, &self.log_path)?;
        Ok(())
    }
}

impl ResultStore for ResultLog {
    fn store(&self, result: &EvaluationResult) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        Self::append_frames(&self.log_path, &[result])
    }

    fn get(&self, id: Uuid) -> Result<Option<EvaluationResult>, StoreError> {
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    fn list(&self, filter: &ResultFilter) -> Result<Vec<EvaluationResult>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }
}
