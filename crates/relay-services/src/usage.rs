//! Pre-call usage gate.
//!
//! Quota accounting lives outside the relay. The dispatcher only asks how
//! much allowance a token has left and refuses to send when the answer is
//! zero or negative.

/// Source of remaining-allowance figures for a token.
pub trait UsageMeter: Send + Sync {
    fn remaining(&self, token: &str) -> i64;
}

/// No quota: every call is allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl UsageMeter for Unmetered {
    fn remaining(&self, _token: &str) -> i64 {
        i64::MAX
    }
}

/// The same allowance for every token.
#[derive(Debug, Clone, Copy)]
pub struct FixedAllowance(pub i64);

impl UsageMeter for FixedAllowance {
    fn remaining(&self, _token: &str) -> i64 {
        self.0
    }
}
