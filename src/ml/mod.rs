pub mod ml_model;
pub mod training;
pub mod inference;

pub use ml_model::{
    ImageClassifier, ClassifierConfig, NUM_CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH, HIDDEN_UNITS,
    load_image, preprocess_image, load_and_preprocess_image,
};
pub use training::{
    WaveDataset, WaveBatcher, WaveBatch, WaveItem, TrainingOptions, TrainedModel, EpochSummary,
    train_model, save_trained_model,
};
pub use inference::{InferenceEngine, Prediction};
