use tokio::time::Duration;
use tokio_util::sync::CancellationToken;


/// Дочерний токен: отменяется вместе с `parent` или по истечении `timeout`
pub fn with_deadline(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let token = parent.child_token();
    let deadline = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = deadline.cancelled() => {}
            _ = tokio::time::sleep(timeout) => deadline.cancel(),
        }
    });

    token
}
