//! Fixation classifier seam
//!
//! Fixation detection (an I-DT style dispersion/duration algorithm) is an external
//! collaborator. The engine only consumes its output: the same gaze stream annotated with
//! `fixation`, `fixation_start`, `fixation_end` and `fixation_duration`.

use crate::config::FixationParams;
use crate::error::AnalysisError;
use crate::types::Frame;

/// Annotates a gaze stream with fixation/saccade flags.
///
/// Implementations must return one frame per input frame, in the same order. Failures
/// are reported as [`AnalysisError::Classifier`] and surface to the caller unchanged.
pub trait FixationClassifier {
    fn classify(&self, frames: Vec<Frame>, params: &FixationParams) -> Result<Vec<Frame>, AnalysisError>;
}

/// Uses the flags already present in the recording.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordedFixations;

impl FixationClassifier for RecordedFixations {
    fn classify(&self, frames: Vec<Frame>, _params: &FixationParams) -> Result<Vec<Frame>, AnalysisError> {
        Ok(frames)
    }
}

/// Run a classifier and make sure it kept the stream intact.
pub fn annotate(
    classifier: &dyn FixationClassifier,
    frames: Vec<Frame>,
    params: &FixationParams,
) -> Result<Vec<Frame>, AnalysisError> {
    let ids: Vec<u64> = frames.iter().map(|f| f.frame_id).collect();
    let annotated = classifier.classify(frames, params)?;

    if annotated.len() != ids.len()
        || annotated.iter().zip(&ids).any(|(f, id)| f.frame_id != *id)
    {
        return Err(AnalysisError::Classifier(format!(
            "classifier returned {} frames for {} input frames or reordered them",
            annotated.len(),
            ids.len()
        )));
    }
    Ok(annotated)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropsFrames;

    impl FixationClassifier for DropsFrames {
        fn classify(&self, mut frames: Vec<Frame>, _: &FixationParams) -> Result<Vec<Frame>, AnalysisError> {
            frames.pop();
            Ok(frames)
        }
    }

    struct Failing;

    impl FixationClassifier for Failing {
        fn classify(&self, _: Vec<Frame>, _: &FixationParams) -> Result<Vec<Frame>, AnalysisError> {
            Err(AnalysisError::Classifier("sampling rate below 30 Hz".to_string()))
        }
    }

    fn frames() -> Vec<Frame> {
        (0..3).map(|i| Frame::new(i, i as f64 * 0.1)).collect()
    }

    #[test]
    fn test_recorded_fixations_pass_through() {
        let mut input = frames();
        input[1].fixation = true;
        let out = annotate(&RecordedFixations, input.clone(), &FixationParams::default()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_truncated_output_rejected() {
        let result = annotate(&DropsFrames, frames(), &FixationParams::default());
        assert!(matches!(result, Err(AnalysisError::Classifier(_))));
    }

    #[test]
    fn test_classifier_errors_propagate() {
        let err = annotate(&Failing, frames(), &FixationParams::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            AnalysisError::Classifier("sampling rate below 30 Hz".to_string()).to_string()
        );
    }
}
