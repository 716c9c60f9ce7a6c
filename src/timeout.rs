use std::time::{Duration, Instant};

/// A deadline checked once per poll iteration. `None` never expires.
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    deadline: Option<Instant>,
}

impl Timeout {
    pub fn new(ms: u64) -> Self {
        Self {
            deadline: Some(Instant::now() + Duration::from_millis(ms)),
        }
    }

    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    pub fn from_ms(ms: Option<u64>) -> Self {
        ms.map_or_else(Self::unbounded, Self::new)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
