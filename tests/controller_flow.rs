mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{Call, ScriptedGateway, PNG_BYTES};
use medassist::controller::{
    AnalyzeOutcome, ControllerError, FollowUpOutcome, InputError, InteractionController,
    InteractionState,
};
use medassist::gateway::{AnalysisMode, GatewayError};
use medassist::session::StagedImage;

fn controller(gateway: &Arc<ScriptedGateway>) -> InteractionController {
    InteractionController::new(gateway.clone())
}

#[tokio::test]
async fn test_symptom_analysis_stores_reply_verbatim() {
    let gateway = ScriptedGateway::new();
    let reply = "Possible causes: tension headache, dehydration.\n\nDisclaimer: This is not a substitute for professional medical advice.";
    gateway.reply(reply);

    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Symptom);

    let outcome = controller
        .analyze(Some("persistent headache and dizziness for 3 days"))
        .await
        .unwrap();

    assert_eq!(outcome, AnalyzeOutcome::Completed(reply.to_string()));
    assert_eq!(controller.last_result(), Some(reply));
    assert_eq!(controller.state(), InteractionState::ShowingResult);
    assert!(controller.follow_up_available());
    assert_eq!(
        gateway.calls(),
        vec![Call::Symptoms(
            "persistent headache and dizziness for 3 days".to_string()
        )]
    );
}

#[tokio::test]
async fn test_image_mode_without_upload_is_ignored() {
    let gateway = ScriptedGateway::new();
    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Image);

    let outcome = controller.analyze(None).await.unwrap();

    assert_eq!(outcome, AnalyzeOutcome::Ignored(InputError::NoImage));
    assert!(gateway.calls().is_empty());
    assert!(controller.last_result().is_none());
    assert_eq!(controller.state(), InteractionState::AwaitingInput);
}

#[tokio::test]
async fn test_blank_symptoms_are_ignored() {
    let gateway = ScriptedGateway::new();
    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Symptom);

    for input in [None, Some(""), Some("   \n\t")] {
        let outcome = controller.analyze(input).await.unwrap();
        assert_eq!(outcome, AnalyzeOutcome::Ignored(InputError::EmptySymptoms));
    }
    assert!(gateway.calls().is_empty());
    assert!(controller.last_result().is_none());
}

#[tokio::test]
async fn test_follow_up_uses_prior_result_and_keeps_it() {
    let gateway = ScriptedGateway::new();
    gateway.reply("Finding: mild inflammation");
    gateway.reply("A dermatologist is a good place to start.");

    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Symptom);
    controller.analyze(Some("red itchy patch on forearm")).await.unwrap();

    let outcome = controller
        .follow_up("What specialist should I see?")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FollowUpOutcome::Answered("A dermatologist is a good place to start.".to_string())
    );
    assert_eq!(controller.last_result(), Some("Finding: mild inflammation"));
    assert_eq!(
        controller.last_answer(),
        Some("A dermatologist is a good place to start.")
    );
    assert_eq!(
        gateway.calls()[1],
        Call::FollowUp {
            query: "What specialist should I see?".to_string(),
            prior_result: "Finding: mild inflammation".to_string(),
        }
    );
}

#[tokio::test]
async fn test_follow_up_without_result_is_ignored() {
    let gateway = ScriptedGateway::new();
    let mut controller = controller(&gateway);

    let outcome = controller.follow_up("Is this serious?").await.unwrap();

    assert_eq!(outcome, FollowUpOutcome::Ignored(InputError::NoPriorResult));
    assert!(gateway.calls().is_empty());
    assert!(controller.last_answer().is_none());
}

#[tokio::test]
async fn test_image_is_deleted_after_successful_analysis() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new();
    gateway.reply("No anomalies detected. Consult with a Doctor before making any decisions.");

    let image = StagedImage::stage("scan.png", PNG_BYTES, 1024, dir.path()).unwrap();
    let staged_path = image.path();
    assert!(staged_path.exists());

    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Image);
    controller.stage_image(image);

    let outcome = controller.analyze(None).await.unwrap();

    assert!(matches!(outcome, AnalyzeOutcome::Completed(_)));
    assert!(!controller.session().has_image());
    assert!(!staged_path.exists());
    assert_eq!(
        gateway.calls(),
        vec![Call::Image {
            media_type: "image/png".to_string(),
            bytes: PNG_BYTES.to_vec(),
        }]
    );
}

#[tokio::test]
async fn test_image_is_deleted_after_failed_analysis() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new();
    gateway.fail(500, "model overloaded");

    let image = StagedImage::stage("xray.jpg", PNG_BYTES, 1024, dir.path()).unwrap();
    let staged_path = image.path();

    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Image);
    controller.stage_image(image);

    let err = controller.analyze(None).await.unwrap_err();

    assert!(matches!(
        err,
        ControllerError::Gateway(GatewayError::Provider { status: 500, .. })
    ));
    assert!(!controller.session().has_image());
    assert!(!staged_path.exists());
    assert!(controller.last_result().is_none());
}

#[tokio::test]
async fn test_failed_analysis_keeps_previous_result() {
    let gateway = ScriptedGateway::new();
    gateway.reply("First analysis");
    gateway.fail(429, "quota exceeded");

    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Symptom);
    controller.analyze(Some("sore throat")).await.unwrap();

    let err = controller.analyze(Some("sore throat and fever")).await.unwrap_err();

    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(controller.last_result(), Some("First analysis"));
    assert_eq!(controller.state(), InteractionState::ShowingResult);

    // The same action can be retried
    gateway.reply("Second analysis");
    controller.analyze(Some("sore throat and fever")).await.unwrap();
    assert_eq!(controller.last_result(), Some("Second analysis"));
}

#[tokio::test]
async fn test_switching_mode_keeps_result() {
    let gateway = ScriptedGateway::new();
    gateway.reply("Symptom analysis");

    let mut controller = controller(&gateway);
    controller.select_mode(AnalysisMode::Symptom);
    controller.analyze(Some("back pain")).await.unwrap();

    controller.select_mode(AnalysisMode::Image);

    assert_eq!(controller.mode(), Some(AnalysisMode::Image));
    assert_eq!(controller.last_result(), Some("Symptom analysis"));
    assert!(controller.follow_up_available());
}
