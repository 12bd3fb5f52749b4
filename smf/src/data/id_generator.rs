//! id_generator - bounded integer identifiers, always handing out the lowest free one
use crate::SmfError;
use index_pool::IndexPool;
use parking_lot::Mutex;

pub struct IdGenerator {
    kind: &'static str,
    min: u64,
    max: u64,
    pool: Mutex<IndexPool>,
}

impl IdGenerator {
    /// Creates a generator issuing ids in the inclusive range `[min, max]`.
    pub fn new(kind: &'static str, min: u64, max: u64) -> Self {
        debug_assert!(min <= max);
        IdGenerator {
            kind,
            min,
            max,
            pool: Mutex::new(IndexPool::new()),
        }
    }

    pub fn allocate(&self) -> Result<u64, SmfError> {
        let mut pool = self.pool.lock();
        let offset = pool.new_id() as u64;
        if offset > self.max - self.min {
            let _ = pool.return_id(offset as usize);
            return Err(SmfError::Exhausted(self.kind));
        }
        Ok(self.min + offset)
    }

    /// Returns an id to the generator.  Returns false if the id was not outstanding.
    pub fn free(&self, id: u64) -> bool {
        if id < self.min || id > self.max {
            return false;
        }
        self.pool.lock().return_id((id - self.min) as usize).is_ok()
    }
}
