mod i2c_dma;
mod state_estimator;

pub use i2c_dma::i2c_dma_task;
pub use state_estimator::state_estimator_task;
