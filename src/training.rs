use core::marker::PhantomData;

use burn::backend::{Autodiff, NdArray, ndarray::NdArrayDevice};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use burn::{LearningRate, config::Config};
use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};

use crate::batch_shuffle::shuffled_batches;
use crate::card::ReviewLog;
use crate::cosine_annealing::CosineAnnealingLR;
use crate::dataset::{ReviewBatch, ReviewItem, items_from_logs, split_data};
use crate::error::{MorphCardsError, Result};
use crate::evaluation::evaluate_items;
use crate::model::{Model, ModelConfig};
use crate::parameter_clipper::parameter_clipper;
use crate::parameters::Parameters;
use crate::pre_training::pretrain;

pub struct BCELoss<B: Backend> {
    backend: PhantomData<B>,
}

impl<B: Backend> BCELoss<B> {
    pub fn new() -> Self {
        Self {
            backend: PhantomData,
        }
    }

    pub fn forward(&self, retentions: Tensor<B, 1>, labels: Tensor<B, 1>) -> Tensor<B, 1> {
        let retentions = retentions.clamp(1e-4, 1.0 - 1e-4);
        let loss =
            labels.clone() * retentions.clone().log() + (-labels + 1) * (-retentions + 1).log();
        loss.mean().neg()
    }
}

impl<B: Backend> Default for BCELoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AutodiffBackend> Model<B> {
    /// Zeroes the gradient of the four initial stabilities so pre-trained
    /// values survive the optimizer step.
    fn freeze_initial_stability(&self, mut grad: B::Gradients) -> B::Gradients {
        if let Some(grad_tensor) = self.w.grad(&grad) {
            let device = grad_tensor.device();
            let updated_grad_tensor =
                grad_tensor.slice_assign([0..4], Tensor::zeros([4], &device));
            self.w.grad_remove(&mut grad);
            self.w.grad_replace(&mut grad, updated_grad_tensor);
        }
        grad
    }
}

#[derive(Config, Debug)]
pub struct OptimizerConfig {
    /// Fewer logs than this are rejected outright.
    #[config(default = 50)]
    pub min_reviews: usize,
    /// Passes over the training items before giving up on convergence.
    #[config(default = 32)]
    pub max_iterations: usize,
    /// Largest change in log-loss between passes that counts as settled.
    #[config(default = 1e-4)]
    pub tolerance: f32,
    #[config(default = 512)]
    pub batch_size: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 4e-2)]
    pub learning_rate: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reported after every pass over the training items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitProgress {
    pub iteration: usize,
    pub max_iterations: usize,
    pub loss: f32,
    pub best_loss: f32,
}

/// Refits the global parameter vector from review history.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    initial: Parameters,
}

type TrainingBackend = Autodiff<NdArray>;

impl Optimizer {
    pub fn new(config: OptimizerConfig, initial: Parameters) -> Self {
        Self { config, initial }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn fit(&self, logs: &[ReviewLog]) -> Result<Parameters> {
        self.fit_with_progress(logs, |_| true)
    }

    /// Like [`Optimizer::fit`], calling `progress` after every pass. Returning
    /// `false` from the callback abandons the fit with
    /// [`MorphCardsError::Interrupted`].
    pub fn fit_with_progress<F>(&self, logs: &[ReviewLog], mut progress: F) -> Result<Parameters>
    where
        F: FnMut(FitProgress) -> bool,
    {
        if logs.len() < self.config.min_reviews {
            return Err(MorphCardsError::InsufficientData {
                reviews: logs.len(),
                required: self.config.min_reviews,
            });
        }
        let mut items = items_from_logs(logs);
        if items.is_empty() {
            return Err(MorphCardsError::InsufficientData {
                reviews: 0,
                required: 1,
            });
        }
        // stable sort keeps equal-length items in card order
        items.sort_by_key(|item| item.reviews.len());

        let average_recall = items
            .iter()
            .filter(|item| item.current().is_some_and(|review| review.rating > 1))
            .count() as f32
            / items.len() as f32;
        let (pre_trainset, _) = split_data(items.clone());
        let initial = match pretrain(&pre_trainset, average_recall) {
            Ok((initial_stability, rating_count)) => {
                info!("pre-trained initial stability {initial_stability:?} from {rating_count:?}");
                self.initial.with_initial_stability(initial_stability)
            }
            Err(MorphCardsError::InsufficientData { .. }) => {
                info!("no first follow-up reviews; keeping initial stability");
                self.initial
            }
            Err(e) => return Err(e),
        };

        train(&items, initial, &self.config, &mut progress)
    }
}

fn train<F>(
    items: &[ReviewItem],
    initial: Parameters,
    config: &OptimizerConfig,
    progress: &mut F,
) -> Result<Parameters>
where
    F: FnMut(FitProgress) -> bool,
{
    type B = TrainingBackend;
    let device = NdArrayDevice::Cpu;
    let model_config = ModelConfig::default().with_freeze_initial_stability(true);

    let mut model: Model<B> = Model::new(&initial);
    let mut optim = AdamConfig::new().init::<B, Model<B>>();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let batch_size = config.batch_size.max(1);
    let batches_per_iteration = items.len().div_ceil(batch_size);
    let mut lr_scheduler = CosineAnnealingLR::init(
        (batches_per_iteration * config.max_iterations) as f64,
        config.learning_rate,
    );

    let mut best = initial;
    let mut best_loss = evaluate_items(&initial, items)?.log_loss;
    let mut previous_loss = best_loss;
    info!("initial log loss {best_loss:.6} over {} items", items.len());

    for iteration in 1..=config.max_iterations {
        for batch in shuffled_batches(items.len(), batch_size, &mut rng) {
            let lr: LearningRate = lr_scheduler.current();
            model = train_step(model, &mut optim, &items[batch], lr, &model_config, &device)?;
            lr_scheduler.step();
        }

        let current = model_parameters(&model)?;
        let loss = evaluate_items(&current, items)?.log_loss;
        if loss < best_loss {
            best_loss = loss;
            best = current;
        }
        debug!("iteration {iteration}: log loss {loss:.6}, best {best_loss:.6}");

        let keep_going = progress(FitProgress {
            iteration,
            max_iterations: config.max_iterations,
            loss,
            best_loss,
        });
        if !keep_going {
            return Err(MorphCardsError::Interrupted);
        }
        if (previous_loss - loss).abs() < config.tolerance {
            info!("converged after {iteration} iterations: {:?}", best.as_slice());
            return Ok(best);
        }
        previous_loss = loss;
    }

    Err(MorphCardsError::NonConvergent {
        best,
        loss: best_loss,
        iterations: config.max_iterations,
    })
}

fn train_step<B, O>(
    model: Model<B>,
    optim: &mut O,
    items: &[ReviewItem],
    lr: LearningRate,
    model_config: &ModelConfig,
    device: &B::Device,
) -> Result<Model<B>>
where
    B: AutodiffBackend,
    O: burn::optim::Optimizer<Model<B>, B>,
{
    let batch = ReviewBatch::<B>::new(items, device);
    let retention = model.forward_classification(batch.t_historys, batch.r_historys, batch.delta_ts);
    let loss = BCELoss::new().forward(retention, batch.labels);
    let mut gradients = loss.backward();
    if model_config.freeze_initial_stability {
        gradients = model.freeze_initial_stability(gradients);
    }
    let grads = GradientsParams::from_grads(gradients, &model);
    let mut model = optim.step(lr, model, grads);
    model.w = parameter_clipper(model.w)?;
    Ok(model)
}

fn model_parameters<B: AutodiffBackend>(model: &Model<B>) -> Result<Parameters> {
    let values = model
        .valid()
        .w
        .val()
        .into_data()
        .to_vec::<f32>()
        .map_err(|_| MorphCardsError::InvalidParameters)?;
    Parameters::new(&values)
}
