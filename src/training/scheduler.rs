//! Learning Rate Schedules
//!
//! Step-level schedules for the training loop. The one-cycle policy warms
//! up linearly from max_lr / div_factor to max_lr over the first pct_start
//! of all steps, then anneals along a cosine down to
//! max_lr / final_div_factor.

use serde::{Deserialize, Serialize};

/// Learning rate schedule evaluated per optimizer step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Constant learning rate
    Constant { lr: f64 },

    /// One-cycle policy: linear warmup then cosine annealing
    OneCycle {
        max_lr: f64,
        total_epochs: usize,
        pct_start: f64,
        div_factor: f64,
        final_div_factor: f64,
    },
}

impl LrSchedule {
    /// Constant schedule
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// One-cycle schedule with the usual defaults
    pub fn one_cycle(max_lr: f64, total_epochs: usize) -> Self {
        Self::OneCycle {
            max_lr,
            total_epochs,
            pct_start: 0.3,
            div_factor: 25.0,
            final_div_factor: 1e4,
        }
    }

    /// Learning rate for a specific step within an epoch
    pub fn lr_at_step(&self, epoch: usize, step: usize, steps_per_epoch: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,

            Self::OneCycle {
                max_lr,
                total_epochs,
                pct_start,
                div_factor,
                final_div_factor,
            } => {
                let initial_lr = max_lr / div_factor;
                let min_lr = max_lr / final_div_factor;
                let total_steps = (*total_epochs as f64) * steps_per_epoch.max(1) as f64;
                let warmup_steps = total_steps * pct_start;
                let current_step = (epoch * steps_per_epoch + step) as f64;

                if current_step < warmup_steps {
                    let progress = current_step / warmup_steps;
                    initial_lr + (max_lr - initial_lr) * progress
                } else {
                    let remaining = total_steps - warmup_steps;
                    let progress = ((current_step - warmup_steps) / remaining).min(1.0);
                    let cosine_factor = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                    min_lr + (max_lr - min_lr) * cosine_factor
                }
            }
        }
    }

    /// Human-readable description of the schedule
    pub fn description(&self) -> String {
        match self {
            Self::Constant { lr } => format!("Constant LR: {:.6}", lr),
            Self::OneCycle {
                max_lr,
                total_epochs,
                ..
            } => format!("One-Cycle: max_lr={:.6}, epochs={}", max_lr, total_epochs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_schedule() {
        let schedule = LrSchedule::constant(0.001);
        assert_eq!(schedule.lr_at_step(0, 0, 100), 0.001);
        assert_eq!(schedule.lr_at_step(3, 50, 100), 0.001);
    }

    #[test]
    fn test_one_cycle_starts_low() {
        let schedule = LrSchedule::one_cycle(1e-4, 4);
        let lr = schedule.lr_at_step(0, 0, 100);
        assert!((lr - 1e-4 / 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_cycle_peaks_at_warmup_end() {
        let schedule = LrSchedule::one_cycle(1e-4, 4);
        // Warmup covers 30% of 400 steps
        let lr = schedule.lr_at_step(1, 20, 100);
        assert!((lr - 1e-4).abs() < 1e-6);
    }

    #[test]
    fn test_one_cycle_ends_near_floor() {
        let schedule = LrSchedule::one_cycle(1e-4, 4);
        let lr = schedule.lr_at_step(3, 99, 100);
        assert!(lr < 1e-4 / 100.0);
        assert!(lr >= 1e-4 / 1e4);
    }

    #[test]
    fn test_one_cycle_monotonic_warmup() {
        let schedule = LrSchedule::one_cycle(1e-3, 10);
        let mut prev = schedule.lr_at_step(0, 0, 10);
        // All 30 warmup steps of 100 total
        for step in 1..30 {
            let lr = schedule.lr_at_step(step / 10, step % 10, 10);
            assert!(lr > prev);
            prev = lr;
        }
    }
}
