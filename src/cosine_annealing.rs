use burn::LearningRate;
use std::f64::consts::PI;

/// Cosine decay of the learning rate over `t_max` optimizer steps, after
/// which the rate climbs back up along the same curve.
#[derive(Clone, Debug)]
pub(crate) struct CosineAnnealingLR {
    t_max: f64,
    eta_min: f64,
    init_lr: LearningRate,
    step_count: f64,
    current_lr: LearningRate,
}

impl CosineAnnealingLR {
    pub fn init(t_max: f64, init_lr: LearningRate) -> CosineAnnealingLR {
        CosineAnnealingLR {
            t_max: t_max.max(1.0),
            eta_min: 0.0,
            init_lr,
            step_count: 0.0,
            current_lr: init_lr,
        }
    }

    pub fn current(&self) -> LearningRate {
        self.current_lr
    }

    /// Advances one step and returns the new rate.
    pub fn step(&mut self) -> LearningRate {
        self.step_count += 1.0;
        let Self {
            t_max,
            eta_min,
            init_lr,
            step_count,
            current_lr,
        } = *self;
        self.current_lr = if (step_count - 1.0 - t_max) % (2.0 * t_max) == 0.0 {
            (init_lr - eta_min) * (1.0 - f64::cos(PI / t_max)) / 2.0
        } else {
            (1.0 + f64::cos(PI * step_count / t_max))
                / (1.0 + f64::cos(PI * (step_count - 1.0) / t_max))
                * (current_lr - eta_min)
                + eta_min
        };
        self.current_lr
    }
}
