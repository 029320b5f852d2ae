//! Request-level error taxonomy.

use env_insights_aqi::AqiError;
use env_insights_database::StoreError;
use env_insights_features::ScenarioError;
use env_insights_model::{ModelError, PredictionError};
use env_insights_pollution_models::InvalidParameterError;
use env_insights_spatial::SpatialError;
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Coarse classification of an [`InsightsError`], exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
pub enum ErrorKind {
    /// No store table for the requested time bucket.
    TableNotFound,
    /// No model artifact for the requested pollutant, quantile and dataset.
    ModelNotFound,
    /// Stored features do not fit the model, or hold missing values.
    FeatureVectorInvalid,
    /// The pollutant has no air quality index breakpoints.
    PollutantUnsupported,
    /// A request parameter is malformed or refers to nothing.
    InvalidRequest,
    /// A server-side fault.
    Internal,
}

/// Anything that can fail while serving a request.
#[derive(Debug, Error)]
pub enum InsightsError {
    /// A request parameter failed validation.
    #[error(transparent)]
    InvalidParameter(#[from] InvalidParameterError),

    /// The scenario could not be parsed.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// The request body could not be decoded.
    #[error("invalid request body: {message}")]
    InvalidBody {
        /// Decoder message.
        message: String,
    },

    /// The requested feature is not a model input.
    #[error("unknown feature '{feature}'")]
    UnknownFeature {
        /// The requested name.
        feature: String,
    },

    /// The bucket's concentration table has no column for the requested
    /// pollutant and quantile.
    #[error("no stored predictions in column '{column}' for time bucket {bucket}")]
    ConcentrationUnavailable {
        /// Bucket key.
        bucket: String,
        /// Column that was looked for.
        column: String,
    },

    /// The stored feature table does not match the feature schema.
    #[error("feature vector invalid: {message}")]
    FeatureVectorInvalid {
        /// Description of what went wrong.
        message: String,
    },

    /// Reading the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Loading a model failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Scoring failed.
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    /// Classification failed.
    #[error(transparent)]
    Aqi(#[from] AqiError),

    /// Geometry or serialization failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// A failure outside the pipeline, such as a lost worker thread.
    #[error("internal error: {message}")]
    Internal {
        /// Description of what went wrong.
        message: String,
    },
}

impl InsightsError {
    /// Coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_)
            | Self::Scenario(_)
            | Self::InvalidBody { .. }
            | Self::UnknownFeature { .. }
            | Self::ConcentrationUnavailable { .. } => ErrorKind::InvalidRequest,
            Self::FeatureVectorInvalid { .. } => ErrorKind::FeatureVectorInvalid,
            Self::Store(StoreError::TableNotFound { .. }) => ErrorKind::TableNotFound,
            Self::Model(ModelError::NotFound { .. }) => ErrorKind::ModelNotFound,
            Self::Prediction(PredictionError::Table(_)) => ErrorKind::Internal,
            Self::Prediction(_) => ErrorKind::FeatureVectorInvalid,
            Self::Aqi(AqiError::PollutantUnsupported { .. }) => ErrorKind::PollutantUnsupported,
            Self::Store(_)
            | Self::Model(_)
            | Self::Aqi(_)
            | Self::Spatial(_)
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the request, rather than the server, is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TableNotFound
                | ErrorKind::ModelNotFound
                | ErrorKind::PollutantUnsupported
                | ErrorKind::InvalidRequest
        )
    }
}
