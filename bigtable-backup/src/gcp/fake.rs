//! In-memory stand-ins for the Google services, used by unit tests.

use super::{Job, JobService, Object, ObjectStore, Table, TableAdmin};
use crate::job::JobSpec;
use crate::paginate::Page;
use crate::{BackupError, Result};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Serve `items` in pages of `page_size`, using the start index as token.
fn page_of<T: Clone>(items: &[T], page_size: usize, token: Option<String>) -> Page<T> {
    let start: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
    let end = (start + page_size).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        next_page_token: (end < items.len()).then(|| end.to_string()),
    }
}

pub struct FakeTableAdmin {
    tables: Vec<Table>,
    page_size: usize,
}

impl FakeTableAdmin {
    /// Tables `projects/p/instances/i/tables/{id}` for each id, two per page.
    pub fn with_ids(ids: &[&str]) -> Self {
        Self {
            tables: ids
                .iter()
                .map(|id| Table {
                    name: format!("projects/p/instances/i/tables/{}", id),
                })
                .collect(),
            page_size: 2,
        }
    }
}

#[async_trait]
impl TableAdmin for FakeTableAdmin {
    async fn list_tables(
        &self,
        _project_id: &str,
        _instance_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<Table>> {
        Ok(page_of(&self.tables, self.page_size, page_token))
    }
}

pub struct FakeObjectStore {
    objects: Mutex<Vec<String>>,
    page_size: usize,
    failing_deletes: Mutex<HashSet<String>>,
    list_calls: Mutex<usize>,
}

impl FakeObjectStore {
    pub fn with_objects(names: &[&str]) -> Self {
        Self {
            objects: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            page_size: 2,
            failing_deletes: Mutex::new(HashSet::new()),
            list_calls: Mutex::new(0),
        }
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }

    pub fn objects(&self) -> Vec<String> {
        self.objects.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
        page_token: Option<String>,
    ) -> Result<Page<Object>> {
        *self.list_calls.lock().unwrap() += 1;
        let matching: Vec<Object> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| Object { name: name.clone() })
            .collect();
        Ok(page_of(&matching, self.page_size, page_token))
    }

    async fn delete_object(&self, _bucket: &str, name: &str) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(BackupError::Storage(format!("deleting {}: permission denied", name)));
        }
        self.objects.lock().unwrap().retain(|object| object != name);
        Ok(())
    }
}

pub struct FakeJobService {
    submitted: Mutex<Vec<JobSpec>>,
    failing_tables: Mutex<HashSet<String>>,
    states: Mutex<VecDeque<String>>,
    polls: Mutex<usize>,
}

impl FakeJobService {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            failing_tables: Mutex::new(HashSet::new()),
            states: Mutex::new(VecDeque::from(["JOB_STATE_DONE".to_string()])),
            polls: Mutex::new(0),
        }
    }

    pub fn fail_submission_for(&self, table_id: &str) {
        self.failing_tables.lock().unwrap().insert(table_id.to_string());
    }

    /// States returned by successive polls; the last one repeats forever.
    pub fn script_states(&self, states: &[&str]) {
        *self.states.lock().unwrap() = states.iter().map(|s| s.to_string()).collect();
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl JobService for FakeJobService {
    async fn create_job_from_template(&self, _project_id: &str, spec: &JobSpec) -> Result<Job> {
        if self.failing_tables.lock().unwrap().contains(&spec.table_id) {
            return Err(BackupError::Api {
                status: 400,
                message: "template launch rejected".to_string(),
            });
        }

        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(spec.clone());
        Ok(Job {
            id: format!("job-{}", submitted.len()),
            name: spec.job_name.clone(),
            current_state: None,
        })
    }

    async fn get_job(&self, _project_id: &str, _location: &str, job_id: &str) -> Result<Job> {
        *self.polls.lock().unwrap() += 1;
        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        };
        Ok(Job {
            id: job_id.to_string(),
            name: String::new(),
            current_state: state,
        })
    }
}
