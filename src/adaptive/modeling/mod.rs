pub mod features;
pub mod network;
pub mod proficiency;

pub use features::{ProficiencyFeatures, FEATURE_DIM};
pub use network::ProficiencyNetwork;
pub use proficiency::{ProficiencyEstimator, RetrainOutcome};
