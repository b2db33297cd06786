use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::llm::ImageService;
use crate::session::{Completion, EditRequest, Operation, PendingOperation, SessionState};

/// Issues the remote call for an operation that `SessionState` has already
/// accepted, then hands the outcome back. The lock is not held across the call.
pub async fn execute<S: ImageService>(
    session: &Mutex<SessionState>,
    service: &S,
    pending: PendingOperation,
) -> Completion {
    let result = match &pending.operation {
        Operation::Generate(attributes) => service.generate(attributes).await,
        Operation::Edit { request, image } => match request {
            EditRequest::Inpaint { prompt, mask_png } => {
                service.inpaint(prompt, image, mask_png).await
            }
            EditRequest::NewScene {
                prompt,
                aspect_ratio,
            } => service.regenerate_scene(prompt, image, *aspect_ratio).await,
            EditRequest::AddText { text, language } => {
                service.add_text(text, language, image).await
            }
        },
    };

    if let Err(err) = &result {
        error!(operation = pending.operation.name(), "Image operation failed: {}", err.0);
    }
    session.lock().complete(pending, result)
}

/// Runs `execute` on its own task so a dropped HTTP connection cannot leave
/// the session stuck in the loading state.
pub async fn execute_detached<S>(
    session: Arc<Mutex<SessionState>>,
    service: Arc<S>,
    pending: PendingOperation,
) -> Completion
where
    S: ImageService + 'static,
{
    let epoch = pending.epoch();
    let task_session = session.clone();
    let handle =
        tokio::spawn(async move { execute(&task_session, service.as_ref(), pending).await });
    match handle.await {
        Ok(completion) => completion,
        Err(err) => {
            error!("Image operation task failed: {}", err);
            session
                .lock()
                .abandon(epoch, format!("Failed to finish the request: {err}"))
        }
    }
}
