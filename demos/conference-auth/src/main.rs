use std::sync::Arc;
use std::time::Duration;

use gatehouse::prelude::*;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Lets in anyone who knows the room password. The `user` credential
/// becomes the identity.
struct SharedSecret {
    secret: String,
}

impl Verifier for SharedSecret {
    async fn verify(&self, ctx: &VerifyContext<'_>) -> Result<Verified, VerificationFailure> {
        let creds = &ctx.request.credentials;
        let user = creds
            .get("user")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| VerificationFailure::MissingCredentials("user".into()))?;

        if creds.get("secret") != Some(&self.secret) {
            return Err(VerificationFailure::Rejected("wrong room password".into()));
        }

        Ok(Verified::new(user.clone()).with_property("method", "shared-secret"))
    }

    fn logout_url(&self, session: &Session) -> Option<String> {
        Some(format!("https://meet.example/bye?room={}", session.conference_name))
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Reads a JSON `SessionConfig` from the path given as the first argument,
/// or falls back to a short-lived demo configuration.
fn load_config() -> Result<SessionConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let config = serde_json::from_str(&raw)?;
            tracing::info!(%path, "loaded session config");
            Ok(config)
        }
        None => Ok(SessionConfig {
            lifetime: Duration::from_secs(60),
            destroy_on_conference_end: true,
            ..SessionConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let (conferences, _) = broadcast::channel::<ConferenceEnded>(64);
    let registry = SessionRegistry::with_event_sink(Arc::new(|event: SessionEvent| {
        tracing::info!(?event, "session event");
    }))
    .into_shared();

    let authority = AuthAuthority::builder(SharedSecret { secret: "hunter2".into() })
        .config(config)
        .registry(registry)
        .conference_lifecycle(Arc::new(conferences.clone()))
        .build();

    authority.add_listener(Arc::new(|peer: &PeerAddress, identity: &str, _: &SessionToken| {
        tracing::info!(%peer, identity, "admitting participant");
    }));
    authority.start().await;

    // Alice logs in from her laptop.
    let login = JoinRequest::new("alice-laptop", "standup")
        .with_credential("user", "alice")
        .with_credential("secret", "hunter2");
    let joined = authority
        .process_join(&login, &PeerAddress::new("standup/alice"))
        .await?;
    println!("alice joined, token {}", joined.session_token);

    // She reconnects, presenting her token alongside her credentials.
    let rejoin = JoinRequest::new("alice-laptop", "standup")
        .with_token(joined.session_token.clone())
        .with_credential("user", "alice")
        .with_credential("secret", "hunter2");
    let again = authority
        .process_join(&rejoin, &PeerAddress::new("standup/alice-2"))
        .await?;
    println!("alice rejoined as {}", again.identity);

    // Someone copies the token to another machine.
    let stolen = JoinRequest::new("mallory-pc", "standup")
        .with_token(joined.session_token.clone());
    match authority
        .process_join(&stolen, &PeerAddress::new("standup/mallory"))
        .await
    {
        Ok(_) => println!("unexpected: stolen token accepted"),
        Err(e) => println!("stolen token refused: {}", serde_json::to_string(&e.to_response())?),
    }

    // Bob is in another conference that ends.
    let bob = JoinRequest::new("bob-phone", "retro")
        .with_credential("user", "bob")
        .with_credential("secret", "hunter2");
    let bob = authority
        .process_join(&bob, &PeerAddress::new("retro/bob"))
        .await?;
    conferences.send(ConferenceEnded::new("retro"))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!(
        "bob's session after retro ended: {}",
        if authority.session(&bob.session_token).await.is_some() { "kept" } else { "gone" }
    );

    // Alice logs out, twice.
    let bye = authority
        .process_logout(&LogoutRequest::new(joined.session_token.clone()))
        .await?;
    println!("alice logged out, continue at {:?}", bye.logout_url);
    if let Err(e) = authority
        .process_logout(&LogoutRequest::new(joined.session_token))
        .await
    {
        println!("second logout: {e}");
    }

    authority.stop().await;
    Ok(())
}
