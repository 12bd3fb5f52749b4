use anyhow::Result;
use smf::{Cause5gsm, SmContextState, SmfError, cause_of};
use smf_tests::framework::*;
use std::time::Duration;

#[async_std::test]
async fn establishment_timeout() -> Result<()> {
    let (smf, [upf1, upf2, upf3, upf4], _logger) = init_with_short_timeout().await?;
    let task = spawn_create(&smf, create_request(SUPI, default_policy()));
    upf1.handle_session_establishment().await?;
    upf2.handle_session_establishment().await?;
    upf3.ignore_session_establishment().await?;

    let e = task.await.unwrap_err();
    assert_eq!(
        e.downcast_ref::<SmfError>(),
        Some(&SmfError::ProtocolTimeout(Duration::from_millis(200)))
    );
    assert_eq!(cause_of(&e), Cause5gsm::NetworkFailure);
    assert_eq!(smf.session_count(), 0);

    // The UPFs that did establish are told to forget the session.
    upf1.handle_session_deletion().await?;
    upf2.handle_session_deletion().await?;
    upf3.expect_nothing().await?;

    // Everything was given back, so the same subscriber can try again.
    let response = establish_default_session(&smf, &[upf1, upf2, upf3, upf4]).await?;
    assert_eq!(response.pdu_address.octets(), [10, 60, 0, 1]);
    Ok(())
}

#[async_std::test]
async fn establishment_rejected() -> Result<()> {
    let (smf, [upf1, upf2, upf3, _upf4], _logger) = init().await?;
    let task = spawn_create(&smf, create_request(SUPI, default_policy()));
    upf1.handle_session_establishment().await?;
    upf2.handle_session_establishment().await?;
    upf3.reject_session_establishment().await?;

    let e = task.await.unwrap_err();
    assert!(matches!(
        e.downcast_ref::<SmfError>(),
        Some(SmfError::Rejected(_))
    ));
    assert_eq!(cause_of(&e), Cause5gsm::NetworkFailure);
    assert_eq!(smf.session_count(), 0);
    Ok(())
}

#[async_std::test]
async fn failed_release_leaves_session_active() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let response = establish_default_session(&smf, &upfs).await?;
    let [upf1, upf2, upf3, _upf4] = &upfs;

    let task = spawn_release(&smf, &response.reference);
    upf1.handle_session_deletion().await?;
    upf2.reject_session_deletion().await?;
    upf3.handle_session_deletion().await?;
    let e = task.await.unwrap_err();
    assert!(matches!(
        e.downcast_ref::<SmfError>(),
        Some(SmfError::Rejected(_))
    ));

    let info = smf.session_info(&response.reference).await.unwrap();
    assert_eq!(info.state, SmContextState::Active);
    assert_eq!(smf.session_count(), 1);
    Ok(())
}
