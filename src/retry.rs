//! Attempt policies shared by segment transmission and whole-request retry.

use std::future::Future;
use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Give up after this many attempts.
    Bounded(NonZeroU32),
    /// Keep trying until an attempt succeeds.
    Forever,
}

impl RetryPolicy {
    /// A bounded policy; zero is treated as a single attempt.
    pub fn bounded(attempts: u32) -> Self {
        RetryPolicy::Bounded(NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN))
    }

    pub fn from_limit(limit: Option<u32>) -> Self {
        limit.map_or(RetryPolicy::Forever, RetryPolicy::bounded)
    }

    /// Attempt numbers, starting at 1.
    pub fn attempts(self) -> Attempts {
        Attempts {
            next: 1,
            limit: match self {
                RetryPolicy::Bounded(limit) => Some(limit.get()),
                RetryPolicy::Forever => None,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attempts {
    next: u32,
    limit: Option<u32>,
}

impl Iterator for Attempts {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.limit.is_some_and(|limit| self.next > limit) {
            return None;
        }
        let attempt = self.next;
        self.next = self.next.saturating_add(1);
        Some(attempt)
    }
}

/// The last error seen once a bounded policy runs out of attempts.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Runs `op` with increasing attempt numbers until it succeeds or the
/// policy is exhausted.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = policy.attempts();
    // The first attempt always runs; the policy only decides about the rest.
    let mut last = Exhausted {
        attempts: 1,
        last: match op(attempts.next().unwrap_or(1)).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        },
    };
    for attempt in attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => last = Exhausted { attempts: attempt, last: err },
        }
    }
    Err(last)
}
