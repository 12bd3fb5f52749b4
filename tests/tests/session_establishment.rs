use anyhow::Result;
use pfcp::{ApplyAction, DestinationInterface, SourceInterface};
use smf::{Cause5gsm, SmContextState, cause_of};
use smf_tests::framework::*;
use std::net::Ipv4Addr;

#[async_std::test]
async fn establish_and_release() -> Result<()> {
    let (smf, [upf1, upf2, upf3, upf4], _logger) = init().await?;
    let task = spawn_create(&smf, create_request(SUPI, default_policy()));

    // Access side UPF: uplink from the gNB over N3, downlink buffered until the gNB tunnel is known.
    let r = upf1.handle_session_establishment().await?;
    assert_eq!(r.create_pdrs.len(), 2);
    assert_eq!(r.create_fars.len(), 2);
    assert_eq!(r.create_qers.len(), 1);
    assert_eq!(r.create_qers[0].qfi, 9);
    assert_eq!(r.create_qers[0].mbr, Some(SESSION_AMBR));
    let uplink = r
        .create_pdrs
        .iter()
        .find(|p| p.pdi.source_interface == SourceInterface::Access)
        .unwrap();
    assert_eq!(
        uplink.pdi.local_fteid.unwrap().ipv4_addr,
        Ipv4Addr::new(192, 168, 179, 1)
    );
    let downlink = r
        .create_pdrs
        .iter()
        .find(|p| p.pdi.source_interface == SourceInterface::Core)
        .unwrap();
    let downlink_far = r
        .create_fars
        .iter()
        .find(|f| f.far_id == downlink.far_id)
        .unwrap();
    assert_eq!(downlink_far.apply_action, ApplyAction::buffer_and_notify());

    upf2.handle_session_establishment().await?;

    // Anchor: downlink from the data network, uplink out to it.
    let r = upf3.handle_session_establishment().await?;
    let downlink = r
        .create_pdrs
        .iter()
        .find(|p| p.pdi.source_interface == SourceInterface::Core)
        .unwrap();
    assert!(downlink.pdi.local_fteid.is_none());
    assert_eq!(downlink.pdi.network_instance.as_deref(), Some("internet"));
    let uplink = r
        .create_pdrs
        .iter()
        .find(|p| p.pdi.source_interface == SourceInterface::Access)
        .unwrap();
    let uplink_far = r
        .create_fars
        .iter()
        .find(|f| f.far_id == uplink.far_id)
        .unwrap();
    let forwarding = uplink_far.forwarding_parameters.as_ref().unwrap();
    assert_eq!(forwarding.destination_interface, DestinationInterface::Core);
    assert!(forwarding.outer_header_creation.is_none());

    let response = task.await?;
    assert_eq!(response.anchor, "UPF3");
    assert_eq!(response.pdu_address, Ipv4Addr::new(10, 60, 0, 1));
    assert_eq!(smf.find_session(SUPI, 1), Some(response.reference.clone()));
    upf4.expect_nothing().await?;

    let info = smf.session_info(&response.reference).await.unwrap();
    assert_eq!(info.state, SmContextState::Active);
    assert_eq!(info.anchor.as_deref(), Some("UPF3"));
    assert_eq!(info.data_paths, vec![vec!["UPF1", "UPF2", "UPF3"]]);
    assert!(info.ulcl.is_none());

    release(&smf, &response.reference, &[&upf1, &upf2, &upf3]).await?;
    assert_eq!(smf.session_count(), 0);
    assert!(smf.session_info(&response.reference).await.is_none());
    assert!(smf.find_session(SUPI, 1).is_none());

    // The address and the rule identifiers went back.
    let response = establish_default_session(&smf, &[upf1, upf2, upf3, upf4]).await?;
    assert_eq!(response.pdu_address, Ipv4Addr::new(10, 60, 0, 1));
    Ok(())
}

#[async_std::test]
async fn duplicate_session_is_rejected() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    establish_default_session(&smf, &upfs).await?;
    let e = smf
        .create_session(create_request(SUPI, default_policy()))
        .await
        .unwrap_err();
    assert_eq!(
        cause_of(&e),
        Cause5gsm::MessageNotCompatibleWithProtocolState
    );
    assert_eq!(smf.session_count(), 1);
    upfs[0].expect_nothing().await
}

#[async_std::test]
async fn static_address() -> Result<()> {
    let (smf, [upf1, upf2, upf3, _upf4], _logger) = init().await?;
    let mut request = create_request(SUPI, default_policy());
    request.requested_address = Some(Ipv4Addr::new(10, 60, 0, 245));
    let task = spawn_create(&smf, request);
    upf1.handle_session_establishment().await?;
    upf2.handle_session_establishment().await?;
    upf3.handle_session_establishment().await?;
    let response = task.await?;
    assert_eq!(response.pdu_address, Ipv4Addr::new(10, 60, 0, 245));

    // Nobody else gets it while it is in use.
    let mut request = create_request("imsi-001010000000002", default_policy());
    request.requested_address = Some(Ipv4Addr::new(10, 60, 0, 245));
    let e = smf.create_session(request).await.unwrap_err();
    assert_eq!(
        cause_of(&e),
        Cause5gsm::InsufficientResourcesForSliceAndDnn
    );
    Ok(())
}

#[async_std::test]
async fn unknown_dnn() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let mut request = create_request(SUPI, default_policy());
    request.dnn = "ims".to_string();
    let e = smf.create_session(request).await.unwrap_err();
    assert_eq!(cause_of(&e), Cause5gsm::MissingOrUnknownDnnInSlice);
    upfs[0].expect_nothing().await
}
