use anyhow::Result;
use pfcp::{ApplyAction, Bitrate, OuterHeaderCreation};
use smf::{AnTunnel, DefaultQos, SessionDelta, SmContextState, SmfError, SmfNotification};
use smf_tests::framework::*;
use std::net::Ipv4Addr;

const GNB_TUNNEL: AnTunnel = AnTunnel {
    ipv4_addr: Ipv4Addr::new(192, 168, 179, 100),
    teid: 0x1234,
};

#[async_std::test]
async fn access_tunnel_then_idle_then_paging() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let response = establish_default_session(&smf, &upfs).await?;
    let [upf1, upf2, upf3, _upf4] = &upfs;
    let notifications = smf.notifications();

    // The gNB tunnel only concerns the access side UPF.
    let task = spawn_modify(
        &smf,
        &response.reference,
        SessionDelta::AnTunnelSetup(GNB_TUNNEL),
    );
    let changes = upf1.handle_session_modification().await?;
    task.await?;
    assert_eq!(changes.update_fars.len(), 1);
    let far = &changes.update_fars[0];
    assert_eq!(far.apply_action, ApplyAction::forward());
    assert_eq!(
        far.forwarding_parameters.as_ref().unwrap().outer_header_creation,
        Some(OuterHeaderCreation::gtpu_ipv4(0x1234, GNB_TUNNEL.ipv4_addr))
    );
    assert!(changes.create_pdrs.is_empty());
    upf2.expect_nothing().await?;
    upf3.expect_nothing().await?;

    // Downlink data while connected needs no paging.
    upf1.send_downlink_data_report(2).await?;
    assert!(notifications.try_recv().is_err());

    // Deactivation: buffer at the access side UPF, with a BAR.
    let task = spawn_modify(&smf, &response.reference, SessionDelta::Deactivate);
    let changes = upf1.handle_session_modification().await?;
    task.await?;
    assert_eq!(changes.create_bars.len(), 1);
    let bar_id = changes.create_bars[0].bar_id;
    assert_eq!(changes.update_fars.len(), 1);
    let far = &changes.update_fars[0];
    assert_eq!(far.apply_action, ApplyAction::buffer_and_notify());
    assert_eq!(far.bar_id, Some(bar_id));
    upf2.expect_nothing().await?;

    upf1.send_downlink_data_report(2).await?;
    assert_eq!(
        notifications.recv().await?,
        SmfNotification::DownlinkDataNotification {
            reference: response.reference.clone(),
            supi: SUPI.to_string(),
            pdu_session_id: 1,
        }
    );

    // Reactivation with a new gNB tunnel.
    let task = spawn_modify(
        &smf,
        &response.reference,
        SessionDelta::AnTunnelSetup(AnTunnel {
            teid: 0x5678,
            ..GNB_TUNNEL
        }),
    );
    let changes = upf1.handle_session_modification().await?;
    task.await?;
    let far = &changes.update_fars[0];
    assert_eq!(far.apply_action, ApplyAction::forward());
    upf1.send_downlink_data_report(2).await?;
    assert!(notifications.try_recv().is_err());

    let info = smf.session_info(&response.reference).await.unwrap();
    assert_eq!(info.state, SmContextState::Active);
    Ok(())
}

#[async_std::test]
async fn session_ambr_change() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let response = establish_default_session(&smf, &upfs).await?;
    let [upf1, upf2, upf3, _upf4] = &upfs;

    let mut update = default_policy();
    let new_ambr = Bitrate {
        uplink: 50_000,
        downlink: 80_000,
    };
    update.session_rules.get_mut("sr-1").unwrap().default_qos = DefaultQos {
        qfi: 9,
        session_ambr: new_ambr,
    };
    let task = spawn_modify(&smf, &response.reference, SessionDelta::PolicyUpdate(update));
    for upf in [upf1, upf2, upf3] {
        let changes = upf.handle_session_modification().await?;
        assert_eq!(changes.update_qers.len(), 1);
        assert_eq!(changes.update_qers[0].mbr, Some(new_ambr));
        assert!(changes.create_pdrs.is_empty());
        assert!(changes.remove_pdrs.is_empty());
    }
    task.await?;

    // The same decision again changes nothing.
    let mut update = default_policy();
    update.session_rules.get_mut("sr-1").unwrap().default_qos.session_ambr = new_ambr;
    smf.modify_session(&response.reference, SessionDelta::PolicyUpdate(update))
        .await?;
    upf1.expect_nothing().await
}

#[async_std::test]
async fn modification_of_unknown_session() -> Result<()> {
    let (smf, _upfs, _logger) = init().await?;
    let e = smf
        .modify_session("urn:uuid:0", SessionDelta::Deactivate)
        .await
        .unwrap_err();
    assert_eq!(
        e.downcast_ref::<SmfError>(),
        Some(&SmfError::SessionNotFound("urn:uuid:0".to_string()))
    );
    Ok(())
}
