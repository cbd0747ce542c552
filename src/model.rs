use crate::memory::{D_MAX, D_MIN, DECAY, FACTOR, S_MAX, S_MIN};
use crate::parameters::{PARAMETER_COUNT, Parameters};
use burn::{
    config::Config,
    module::{Module, Param},
    tensor::{Shape, Tensor, TensorData, backend::Backend},
};

/// Differentiable form of the memory model, batched over review histories.
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    pub w: Param<Tensor<B, 1>>,
}

pub(crate) trait Get<B: Backend, const N: usize> {
    fn get(&self, n: usize) -> Tensor<B, N>;
}

impl<B: Backend, const N: usize> Get<B, N> for Tensor<B, N> {
    fn get(&self, n: usize) -> Self {
        self.clone().slice([n..(n + 1)])
    }
}

impl<B: Backend> Model<B> {
    pub fn new(parameters: &Parameters) -> Self {
        Self {
            w: Param::from_tensor(Tensor::from_floats(
                TensorData::new(parameters.as_slice().to_vec(), Shape::new([PARAMETER_COUNT])),
                &B::Device::default(),
            )),
        }
    }

    pub fn power_forgetting_curve(&self, t: Tensor<B, 1>, s: Tensor<B, 1>) -> Tensor<B, 1> {
        (t / s).mul_scalar(FACTOR).add_scalar(1.0).powf_scalar(DECAY)
    }

    pub(crate) fn init_stability(&self, rating: Tensor<B, 1>) -> Tensor<B, 1> {
        self.w.val().select(0, rating.int() - 1)
    }

    fn init_difficulty(&self, rating: Tensor<B, 1>) -> Tensor<B, 1> {
        self.w.get(4) - (self.w.get(5) * (rating - 1)).exp() + 1
    }

    fn linear_damping(&self, delta_d: Tensor<B, 1>, old_d: Tensor<B, 1>) -> Tensor<B, 1> {
        old_d.neg().add_scalar(10.0) * delta_d.div_scalar(9.0)
    }

    fn next_difficulty(&self, difficulty: Tensor<B, 1>, rating: Tensor<B, 1>) -> Tensor<B, 1> {
        let delta_d = -self.w.get(6) * (rating - 3);
        difficulty.clone() + self.linear_damping(delta_d, difficulty)
    }

    fn stability_after_success(
        &self,
        last_s: Tensor<B, 1>,
        last_d: Tensor<B, 1>,
        r: Tensor<B, 1>,
        rating: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let batch_size = rating.dims()[0];
        let hard_penalty = Tensor::ones([batch_size], &B::Device::default())
            .mask_where(rating.clone().equal_elem(2), self.w.get(14));
        let easy_bonus = Tensor::ones([batch_size], &B::Device::default())
            .mask_where(rating.equal_elem(4), self.w.get(15));

        last_s.clone()
            * (self.w.get(7).exp()
                * (-last_d + 11)
                * (last_s.powf(-self.w.get(8)))
                * (((-r + 1) * self.w.get(9)).exp() - 1)
                * hard_penalty
                * easy_bonus
                + 1)
    }

    fn stability_after_failure(
        &self,
        last_s: Tensor<B, 1>,
        last_d: Tensor<B, 1>,
        r: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let new_s = self.w.get(10)
            * last_d.powf(-self.w.get(11))
            * ((last_s.clone() + 1).powf(self.w.get(12)) - 1)
            * ((-r + 1) * self.w.get(13)).exp();
        let new_s_max = last_s / self.w.get(16).exp();
        new_s
            .clone()
            .mask_where(new_s_max.clone().lower(new_s), new_s_max)
    }

    /// Applies the `nth` review of every history in the batch. A rating of 0
    /// marks padding and leaves that row's state untouched.
    pub(crate) fn step(
        &self,
        delta_t: Tensor<B, 1>,
        rating: Tensor<B, 1>,
        state: MemoryStateTensors<B>,
        nth: usize,
    ) -> MemoryStateTensors<B> {
        if nth == 0 {
            let rating = rating.clamp(1, 4);
            return MemoryStateTensors {
                stability: self.init_stability(rating.clone()).clamp(S_MIN, S_MAX),
                difficulty: self.init_difficulty(rating).clamp(D_MIN, D_MAX),
            };
        }

        let last_s = state.stability.clamp(S_MIN, S_MAX);
        let last_d = state.difficulty.clamp(D_MIN, D_MAX);

        let retrievability = self.power_forgetting_curve(delta_t, last_s.clone());
        let stability_after_success = self.stability_after_success(
            last_s.clone(),
            last_d.clone(),
            retrievability.clone(),
            rating.clone(),
        );
        let stability_after_failure =
            self.stability_after_failure(last_s.clone(), last_d.clone(), retrievability);
        let mut new_s = stability_after_success
            .mask_where(rating.clone().equal_elem(1), stability_after_failure);
        let mut new_d = self
            .next_difficulty(last_d.clone(), rating.clone())
            .clamp(D_MIN, D_MAX);

        new_s = new_s.mask_where(rating.clone().equal_elem(0), last_s);
        new_d = new_d.mask_where(rating.equal_elem(0), last_d);
        MemoryStateTensors {
            stability: new_s.clamp(S_MIN, S_MAX),
            difficulty: new_d,
        }
    }

    /// Runs `[seq_len, batch_size]` histories through the model, starting
    /// from the first review of each.
    pub(crate) fn forward(
        &self,
        delta_ts: Tensor<B, 2>,
        ratings: Tensor<B, 2>,
    ) -> MemoryStateTensors<B> {
        let [seq_len, batch_size] = delta_ts.dims();
        let mut state = MemoryStateTensors::zeros(batch_size);
        for i in 0..seq_len {
            let delta_t = delta_ts.get(i).squeeze(0);
            // [batch_size]
            let rating = ratings.get(i).squeeze(0);
            // [batch_size]
            state = self.step(delta_t, rating, state, i);
        }
        state
    }

    /// Predicted recall probability of the review that follows each history.
    pub(crate) fn forward_classification(
        &self,
        t_historys: Tensor<B, 2>,
        r_historys: Tensor<B, 2>,
        delta_ts: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let state = self.forward(t_historys, r_historys);
        self.power_forgetting_curve(delta_ts, state.stability)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryStateTensors<B: Backend> {
    pub stability: Tensor<B, 1>,
    pub difficulty: Tensor<B, 1>,
}

impl<B: Backend> MemoryStateTensors<B> {
    pub(crate) fn zeros(batch_size: usize) -> MemoryStateTensors<B> {
        MemoryStateTensors {
            stability: Tensor::zeros([batch_size], &B::Device::default()),
            difficulty: Tensor::zeros([batch_size], &B::Device::default()),
        }
    }
}

#[derive(Config, Debug, Default)]
pub struct ModelConfig {
    #[config(default = false)]
    pub freeze_initial_stability: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryState, power_forgetting_curve};
    use crate::parameters::DEFAULT_PARAMETERS;
    use crate::rating::Rating;
    use crate::test_helpers::TestHelper;
    use crate::test_helpers::{Model, Tensor};
    use burn::backend::ndarray::NdArrayDevice;
    use burn::tensor::TensorData;

    #[test]
    fn test_w() {
        let model = Model::new(&Parameters::default());
        assert_eq!(
            model.w.val().to_data(),
            TensorData::from(DEFAULT_PARAMETERS)
        )
    }

    #[test]
    fn weights_follow_parameters() {
        let parameters = Parameters::default().with_initial_stability([0.5, 1.5, 4.0, 20.0]);
        let model = Model::new(&parameters);
        let w = model.w.val().to_data().to_vec::<f32>().unwrap();
        assert_eq!(w, parameters.as_slice());
    }

    #[test]
    fn test_power_forgetting_curve() {
        let device = NdArrayDevice::Cpu;
        let model = Model::new(&Parameters::default());
        let delta_t = Tensor::from_floats([0.0, 1.0, 2.0, 4.0, 5.0], &device);
        let stability = Tensor::from_floats([1.0, 2.0, 3.0, 4.0, 2.0], &device);
        let retrievability = model.power_forgetting_curve(delta_t, stability);

        retrievability
            .to_data()
            .to_vec::<f32>()
            .unwrap()
            .assert_approx_eq([1.0, 0.946059, 0.9299294, 0.9, 0.793946]);
    }

    #[test]
    fn test_init_stability() {
        let device = NdArrayDevice::Cpu;
        let model = Model::new(&Parameters::default());
        let rating = Tensor::from_floats([1.0, 2.0, 3.0, 4.0, 1.0, 2.0], &device);
        let stability = model.init_stability(rating);
        assert_eq!(
            stability.to_data(),
            TensorData::from([
                DEFAULT_PARAMETERS[0],
                DEFAULT_PARAMETERS[1],
                DEFAULT_PARAMETERS[2],
                DEFAULT_PARAMETERS[3],
                DEFAULT_PARAMETERS[0],
                DEFAULT_PARAMETERS[1]
            ])
        )
    }

    #[test]
    fn test_init_difficulty() {
        let device = NdArrayDevice::Cpu;
        let model = Model::new(&Parameters::default());
        let rating = Tensor::from_floats([1.0, 2.0, 3.0, 4.0], &device);
        model
            .init_difficulty(rating)
            .to_data()
            .to_vec::<f32>()
            .unwrap()
            .assert_approx_eq([7.2102, 6.5085473, 5.314578, 3.2828565]);
    }

    #[test]
    fn test_next_difficulty() {
        let device = NdArrayDevice::Cpu;
        let model = Model::new(&Parameters::default());
        let difficulty = Tensor::from_floats([5.0; 4], &device);
        let rating = Tensor::from_floats([1.0, 2.0, 3.0, 4.0], &device);
        let next_difficulty = model.next_difficulty(difficulty, rating);
        next_difficulty.clone().backward();

        next_difficulty
            .to_data()
            .to_vec::<f32>()
            .unwrap()
            .assert_approx_eq([6.1834445, 5.591722, 5.0, 4.408278]);
    }

    #[test]
    fn padding_keeps_state() {
        let device = NdArrayDevice::Cpu;
        let model = Model::new(&Parameters::default());
        let delta_ts = Tensor::from_floats([[0.0, 0.0], [3.0, 0.0]], &device);
        let ratings = Tensor::from_floats([[3.0, 3.0], [3.0, 0.0]], &device);
        let state = model.forward(delta_ts, ratings);
        let stability = state.stability.to_data().to_vec::<f32>().unwrap();
        assert_eq!(stability[1], DEFAULT_PARAMETERS[2]);
        assert!(stability[0] > DEFAULT_PARAMETERS[2]);
    }

    #[test]
    fn forward_matches_scalar_model() {
        let device = NdArrayDevice::Cpu;
        let model = Model::new(&Parameters::default());
        let w = Parameters::default();
        let histories: [[(f32, u32); 4]; 5] = [
            [(0.0, 3), (3.0, 3), (12.0, 3), (30.0, 3)],
            [(0.0, 1), (1.0, 1), (1.0, 3), (4.0, 2)],
            [(0.0, 4), (16.0, 1), (0.0, 3), (2.0, 4)],
            [(0.0, 2), (0.5, 2), (5.0, 1), (1.0, 3)],
            [(0.0, 3), (90.0, 4), (200.0, 3), (1.0, 1)],
        ];

        let mut delta_ts = Vec::new();
        let mut ratings = Vec::new();
        for i in 0..4 {
            for history in &histories {
                delta_ts.push(history[i].0);
                ratings.push(history[i].1 as f32);
            }
        }
        let delta_ts =
            Tensor::<1>::from_floats(TensorData::new(delta_ts, Shape::new([20])), &device)
                .reshape([4, 5]);
        let ratings =
            Tensor::<1>::from_floats(TensorData::new(ratings, Shape::new([20])), &device)
                .reshape([4, 5]);
        let state = model.forward(delta_ts, ratings);
        let stability = state.stability.to_data().to_vec::<f32>().unwrap();
        let difficulty = state.difficulty.to_data().to_vec::<f32>().unwrap();

        for (i, history) in histories.iter().enumerate() {
            let mut scalar: Option<MemoryState> = None;
            for &(delta_t, rating) in history {
                let rating = Rating::try_from(rating).unwrap();
                scalar = Some(match scalar {
                    None => MemoryState::initial(&w, rating).unwrap(),
                    Some(state) => state.next(&w, rating, delta_t).unwrap(),
                });
            }
            let scalar = scalar.unwrap();
            let tolerance = 1e-4 * scalar.stability.max(1.0);
            assert!(
                (stability[i] - scalar.stability).abs() < tolerance,
                "{i}: {} vs {}",
                stability[i],
                scalar.stability
            );
            assert!((difficulty[i] - scalar.difficulty).abs() < 1e-4);
        }

        let retrievability = model
            .power_forgetting_curve(
                Tensor::from_floats([7.0], &device),
                Tensor::from_floats([stability[0]], &device),
            )
            .into_scalar();
        assert!((retrievability - power_forgetting_curve(7.0, stability[0])).abs() < 1e-5);
    }

    #[test]
    fn gradients_reach_every_parameter() {
        let device = NdArrayDevice::Cpu;
        let model = Model::new(&Parameters::default());
        let t_historys = Tensor::from_floats([[0.0, 0.0, 0.0, 0.0], [3.0, 2.0, 5.0, 8.0]], &device);
        let r_historys = Tensor::from_floats([[1.0, 2.0, 3.0, 4.0], [1.0, 2.0, 3.0, 4.0]], &device);
        let delta_ts = Tensor::from_floats([4.0, 6.0, 9.0, 20.0], &device);
        let retrievability = model.forward_classification(t_historys, r_historys, delta_ts);
        let gradients = retrievability.sum().backward();
        let grad = model
            .w
            .grad(&gradients)
            .unwrap()
            .to_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(grad.len(), PARAMETER_COUNT);
        assert!(grad.iter().all(|g| g.is_finite()));
        assert!(grad[..4].iter().all(|g| *g != 0.0));
        assert!(grad[7..10].iter().all(|g| *g != 0.0));
    }
}
