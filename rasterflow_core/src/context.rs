//! The context: the root object hosts create first.
//!
//! A context hands out jobs with fresh debug ids. Contexts are not
//! thread-safe; create one per thread, or synchronize access yourself.

use crate::job::Job;
use log::debug;

pub struct Context {
    next_job_id: i32,
}

impl Context {
    pub fn create() -> Context {
        Context { next_job_id: 0 }
    }

    /// A fresh job: no recording, default pass limit.
    pub fn create_job(&mut self) -> Job {
        let id = self.next_job_id;
        self.next_job_id += 1;
        debug!("created job {}", id);
        Job::new(id)
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::create()
    }
}
