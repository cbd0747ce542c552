use crate::{
    error::{MorphCardsError, Result},
    memory::{D_MAX, D_MIN, S_MIN},
    pre_training::INIT_S_MAX,
};
use burn::{
    module::Param,
    tensor::{Tensor, TensorData, backend::Backend},
};
use log::debug;

pub(crate) fn parameter_clipper<B: Backend>(
    parameters: Param<Tensor<B, 1>>,
) -> Result<Param<Tensor<B, 1>>> {
    let (id, val) = parameters.consume();
    let values = val
        .to_data()
        .to_vec::<f32>()
        .map_err(|_| MorphCardsError::InvalidParameters)?;
    let clipped = clip_parameters(&values);
    if clipped != values {
        debug!("clipped parameters after step: {clipped:?}");
    }
    Ok(Param::initialized(
        id,
        Tensor::from_data(TensorData::new(clipped, val.shape()), &B::Device::default())
            .require_grad(),
    ))
}

pub(crate) fn clip_parameters(parameters: &[f32]) -> Vec<f32> {
    let mut parameters = parameters.to_vec();
    let clamps: [(f32, f32); 17] = [
        (S_MIN, INIT_S_MAX),
        (S_MIN, INIT_S_MAX),
        (S_MIN, INIT_S_MAX),
        (S_MIN, INIT_S_MAX),
        (D_MIN, D_MAX),
        (0.001, 4.0),
        (0.001, 4.0),
        (0.0, 4.5),
        (0.0, 0.8),
        (0.001, 3.5),
        (0.001, 5.0),
        (0.001, 0.25),
        (0.001, 0.9),
        (0.0, 4.0),
        (0.01, 1.0),
        (1.0, 6.0),
        // a lapse always shrinks stability by at least e^0.01
        (0.01, 2.0),
    ];

    parameters
        .iter_mut()
        .zip(clamps)
        .for_each(|(w, (low, high))| *w = w.clamp(low, high));
    parameters
}
