//! Interaction flow for one session: choose a mode, submit input, show the
//! model's analysis, then answer follow-up questions about it.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::{
    AnalysisMode, AnalysisRequest, FollowUpRequest, GatewayError, ModelGateway,
};
use crate::session::{SessionSnapshot, SessionStore, StagedImage, UploadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Idle,
    AwaitingInput,
    Requesting,
    ShowingResult,
    AwaitingFollowUp,
}

/// Input that is missing at trigger time. The action is ignored.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputError {
    #[error("Choose an analysis type first")]
    NoMode,

    #[error("Upload an image before analyzing")]
    NoImage,

    #[error("Describe your symptoms before analyzing")]
    EmptySymptoms,

    #[error("Enter a question first")]
    EmptyQuery,

    #[error("There is no analysis to ask about yet")]
    NoPriorResult,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    Completed(String),
    Ignored(InputError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpOutcome {
    Answered(String),
    Ignored(InputError),
}

/// Everything a front-end needs to render the session.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerView {
    pub mode: Option<AnalysisMode>,
    pub state: InteractionState,
    #[serde(flatten)]
    pub session: SessionSnapshot,
    pub last_answer: Option<String>,
    pub follow_up_available: bool,
}

pub struct InteractionController {
    gateway: Arc<dyn ModelGateway>,
    store: SessionStore,
    mode: Option<AnalysisMode>,
    state: InteractionState,
    last_answer: Option<String>,
}

impl InteractionController {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            store: SessionStore::new(),
            mode: None,
            state: InteractionState::Idle,
            last_answer: None,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn mode(&self) -> Option<AnalysisMode> {
        self.mode
    }

    pub fn session(&self) -> &SessionStore {
        &self.store
    }

    pub fn last_result(&self) -> Option<&str> {
        self.store.last_result()
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.last_answer.as_deref()
    }

    /// Follow-up questions need a prior analysis.
    pub fn follow_up_available(&self) -> bool {
        self.store.last_result().is_some()
    }

    pub fn view(&self) -> ControllerView {
        ControllerView {
            mode: self.mode,
            state: self.state,
            session: self.store.snapshot(),
            last_answer: self.last_answer.clone(),
            follow_up_available: self.follow_up_available(),
        }
    }

    /// Pick image or symptom analysis. The previous result stays available.
    pub fn select_mode(&mut self, mode: AnalysisMode) {
        self.mode = Some(mode);
        self.transition(InteractionState::AwaitingInput);
    }

    pub fn stage_image(&mut self, image: StagedImage) {
        info!("Image staged: {} ({} bytes)", image.name(), image.size());
        self.store.stage_image(image);
    }

    /// Run the analysis for the selected mode.
    ///
    /// Missing input is ignored without contacting the model. On failure the
    /// previous result is kept.
    pub async fn analyze(
        &mut self,
        symptoms: Option<&str>,
    ) -> Result<AnalyzeOutcome, ControllerError> {
        let Some(mode) = self.mode else {
            return Ok(self.ignore_analysis(InputError::NoMode));
        };

        match mode {
            AnalysisMode::Image => {
                let Some(image) = self.store.take_image() else {
                    return Ok(self.ignore_analysis(InputError::NoImage));
                };

                let previous = self.transition(InteractionState::Requesting);
                let result = self.dispatch_image(&image).await;

                // The upload is released whether or not the call succeeded
                let name = image.name().to_string();
                if let Err(e) = image.release() {
                    warn!("Failed to delete staged upload {}: {}", name, e);
                }

                self.finish_analysis(result, previous)
            }
            AnalysisMode::Symptom => {
                let Some(description) = symptoms.map(str::trim).filter(|s| !s.is_empty()) else {
                    return Ok(self.ignore_analysis(InputError::EmptySymptoms));
                };

                let previous = self.transition(InteractionState::Requesting);
                let request = AnalysisRequest::Symptom(description.to_string());
                let result = self.dispatch(request).await;

                self.finish_analysis(result, previous)
            }
        }
    }

    /// Answer a question about the last analysis without replacing it.
    pub async fn follow_up(&mut self, query: &str) -> Result<FollowUpOutcome, ControllerError> {
        let Some(context) = self.store.last_result().map(str::to_string) else {
            debug!("Follow-up ignored: no prior result");
            return Ok(FollowUpOutcome::Ignored(InputError::NoPriorResult));
        };

        let query = query.trim();
        if query.is_empty() {
            debug!("Follow-up ignored: empty query");
            return Ok(FollowUpOutcome::Ignored(InputError::EmptyQuery));
        }

        let previous = self.transition(InteractionState::AwaitingFollowUp);
        self.transition(InteractionState::Requesting);

        let request = FollowUpRequest {
            query: query.to_string(),
            context,
        };
        let gateway = Arc::clone(&self.gateway);

        match request.dispatch(gateway.as_ref()).await {
            Ok(answer) => {
                self.last_answer = Some(answer.clone());
                self.transition(InteractionState::ShowingResult);
                Ok(FollowUpOutcome::Answered(answer))
            }
            Err(e) => {
                warn!("Follow-up failed: {}", e);
                self.transition(previous);
                Err(e.into())
            }
        }
    }

    /// Drop the upload and all results.
    pub fn reset(&mut self) {
        self.store.clear();
        self.last_answer = None;
        self.mode = None;
        self.transition(InteractionState::Idle);
    }

    async fn dispatch_image(&self, image: &StagedImage) -> Result<String, ControllerError> {
        let payload = image.payload()?;
        self.dispatch(AnalysisRequest::Image(payload)).await
    }

    async fn dispatch(&self, request: AnalysisRequest) -> Result<String, ControllerError> {
        info!("Requesting {} analysis", request.mode());
        Ok(request.dispatch(self.gateway.as_ref()).await?)
    }

    fn finish_analysis(
        &mut self,
        result: Result<String, ControllerError>,
        previous: InteractionState,
    ) -> Result<AnalyzeOutcome, ControllerError> {
        match result {
            Ok(text) => {
                self.store.record_result(text.clone());
                self.last_answer = None;
                self.transition(InteractionState::ShowingResult);
                Ok(AnalyzeOutcome::Completed(text))
            }
            Err(e) => {
                warn!("Analysis failed: {}", e);
                self.transition(previous);
                Err(e)
            }
        }
    }

    fn ignore_analysis(&self, reason: InputError) -> AnalyzeOutcome {
        debug!("Analyze ignored in state {:?}: {}", self.state, reason);
        AnalyzeOutcome::Ignored(reason)
    }

    /// Move to `next`, returning the state left behind.
    fn transition(&mut self, next: InteractionState) -> InteractionState {
        let previous = std::mem::replace(&mut self.state, next);
        if previous != next {
            debug!("Interaction state {:?} -> {:?}", previous, next);
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockModelGateway;

    fn controller(gateway: MockModelGateway) -> InteractionController {
        InteractionController::new(Arc::new(gateway))
    }

    fn silent_gateway() -> MockModelGateway {
        let mut gateway = MockModelGateway::new();
        gateway.expect_analyze_image().never();
        gateway.expect_analyze_symptoms().never();
        gateway.expect_answer_follow_up().never();
        gateway
    }

    #[tokio::test]
    async fn test_analyze_without_mode_is_ignored() {
        let mut ctl = controller(silent_gateway());
        let outcome = ctl.analyze(Some("headache")).await.unwrap();
        assert_eq!(outcome, AnalyzeOutcome::Ignored(InputError::NoMode));
        assert_eq!(ctl.state(), InteractionState::Idle);
    }

    #[tokio::test]
    async fn test_blank_symptoms_are_ignored() {
        let mut ctl = controller(silent_gateway());
        ctl.select_mode(AnalysisMode::Symptom);

        for input in [None, Some(""), Some("   \n")] {
            let outcome = ctl.analyze(input).await.unwrap();
            assert_eq!(outcome, AnalyzeOutcome::Ignored(InputError::EmptySymptoms));
        }
        assert_eq!(ctl.state(), InteractionState::AwaitingInput);
        assert!(ctl.last_result().is_none());
    }

    #[tokio::test]
    async fn test_symptom_analysis_stores_verbatim_text() {
        let mut gateway = MockModelGateway::new();
        gateway
            .expect_analyze_symptoms()
            .withf(|d| d == "persistent headache and dizziness for 3 days")
            .times(1)
            .returning(|_| Ok("Possible causes: ... Disclaimer: ...".to_string()));

        let mut ctl = controller(gateway);
        ctl.select_mode(AnalysisMode::Symptom);
        let outcome = ctl
            .analyze(Some("  persistent headache and dizziness for 3 days\n"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            AnalyzeOutcome::Completed("Possible causes: ... Disclaimer: ...".to_string())
        );
        assert_eq!(ctl.last_result(), Some("Possible causes: ... Disclaimer: ..."));
        assert_eq!(ctl.state(), InteractionState::ShowingResult);
        assert!(ctl.follow_up_available());
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_previous_result() {
        let mut gateway = MockModelGateway::new();
        let mut calls = 0;
        gateway
            .expect_analyze_symptoms()
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok("first result".to_string())
                } else {
                    Err(GatewayError::RateLimited("quota".to_string()))
                }
            });

        let mut ctl = controller(gateway);
        ctl.select_mode(AnalysisMode::Symptom);
        ctl.analyze(Some("cough")).await.unwrap();
        ctl.select_mode(AnalysisMode::Symptom);

        let err = ctl.analyze(Some("fever")).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Gateway(GatewayError::RateLimited(_))
        ));
        assert_eq!(ctl.last_result(), Some("first result"));
        assert_eq!(ctl.state(), InteractionState::AwaitingInput);
    }

    #[tokio::test]
    async fn test_image_mode_without_upload_is_ignored() {
        let mut ctl = controller(silent_gateway());
        ctl.select_mode(AnalysisMode::Image);

        let outcome = ctl.analyze(None).await.unwrap();
        assert_eq!(outcome, AnalyzeOutcome::Ignored(InputError::NoImage));
        assert!(ctl.last_result().is_none());
        assert_eq!(ctl.state(), InteractionState::AwaitingInput);
    }

    #[tokio::test]
    async fn test_image_is_released_after_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut gateway = MockModelGateway::new();
        let mut calls = 0;
        gateway
            .expect_analyze_image()
            .withf(|img| img.media_type == "image/png" && img.bytes == b"png-bytes")
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok("Finding: clear".to_string())
                } else {
                    Err(GatewayError::EmptyResponse)
                }
            });

        let mut ctl = controller(gateway);
        ctl.select_mode(AnalysisMode::Image);

        let image = StagedImage::stage("scan.png", b"png-bytes", 1024, dir.path()).unwrap();
        let path = image.path();
        ctl.stage_image(image);
        let outcome = ctl.analyze(None).await.unwrap();
        assert_eq!(outcome, AnalyzeOutcome::Completed("Finding: clear".to_string()));
        assert!(!path.exists());
        assert!(!ctl.session().has_image());

        let image = StagedImage::stage("scan.png", b"png-bytes", 1024, dir.path()).unwrap();
        let path = image.path();
        ctl.stage_image(image);
        assert!(ctl.analyze(None).await.is_err());
        assert!(!path.exists());
        assert!(!ctl.session().has_image());
        assert_eq!(ctl.last_result(), Some("Finding: clear"));
    }

    #[tokio::test]
    async fn test_follow_up_requires_prior_result() {
        let mut ctl = controller(silent_gateway());
        let outcome = ctl.follow_up("What specialist should I see?").await.unwrap();
        assert_eq!(outcome, FollowUpOutcome::Ignored(InputError::NoPriorResult));
        assert!(!ctl.follow_up_available());
    }

    #[tokio::test]
    async fn test_follow_up_passes_context_and_keeps_result() {
        let mut gateway = MockModelGateway::new();
        gateway
            .expect_analyze_symptoms()
            .returning(|_| Ok("Finding: mild inflammation".to_string()));
        gateway
            .expect_answer_follow_up()
            .withf(|q, c| q == "What specialist should I see?" && c == "Finding: mild inflammation")
            .times(1)
            .returning(|_, _| Ok("See a rheumatologist. Consult a doctor.".to_string()));

        let mut ctl = controller(gateway);
        ctl.select_mode(AnalysisMode::Symptom);
        ctl.analyze(Some("swollen knee")).await.unwrap();

        assert_eq!(
            ctl.follow_up("   ").await.unwrap(),
            FollowUpOutcome::Ignored(InputError::EmptyQuery)
        );

        let outcome = ctl.follow_up("What specialist should I see?").await.unwrap();
        assert_eq!(
            outcome,
            FollowUpOutcome::Answered("See a rheumatologist. Consult a doctor.".to_string())
        );
        assert_eq!(ctl.last_result(), Some("Finding: mild inflammation"));
        assert_eq!(ctl.last_answer(), Some("See a rheumatologist. Consult a doctor."));
        assert_eq!(ctl.state(), InteractionState::ShowingResult);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let mut gateway = MockModelGateway::new();
        gateway
            .expect_analyze_symptoms()
            .returning(|_| Ok("result".to_string()));

        let mut ctl = controller(gateway);
        ctl.select_mode(AnalysisMode::Symptom);
        ctl.analyze(Some("rash")).await.unwrap();
        ctl.reset();

        let view = ctl.view();
        assert_eq!(view.state, InteractionState::Idle);
        assert!(view.mode.is_none());
        assert!(view.session.last_result.is_none());
        assert!(!view.follow_up_available);
    }
}
