use anyhow::Result;
use pfcp::SourceInterface;
use smf::{
    Cause5gsm, PccRule, RouteToLocation, SessionDelta, SmContextState, SmPolicyDecision, SmfError,
    SmfNotification, TrafficControlData, cause_of,
};
use smf_tests::framework::*;

fn video_rule() -> PccRule {
    PccRule {
        id: "pcc-video".to_string(),
        precedence: 50,
        flow_description: None,
        app_id: Some("video".to_string()),
        traffic_control: None,
        qos_data: None,
    }
}

fn update_with(rule: PccRule) -> SmPolicyDecision {
    let mut update = SmPolicyDecision::default();
    update.pcc_rules.insert(rule.id.clone(), rule);
    update
}

#[async_std::test]
async fn moving_mec_rule_to_another_dnai() -> Result<()> {
    let (smf, [upf1, upf2, upf3, upf4], _logger) = init().await?;
    let notifications = smf.notifications();
    let task = spawn_create(&smf, create_request(SUPI, mec_policy()));
    for upf in [&upf1, &upf2, &upf3, &upf4] {
        upf.handle_session_establishment().await?;
    }
    let response = task.await?;
    assert_eq!(
        notifications.recv().await?,
        SmfNotification::UpPathChange {
            reference: response.reference.clone(),
            pcc_rule_id: "pcc-mec".to_string(),
            source_dnai: None,
            target_dnai: Some("mec".to_string()),
        }
    );

    // Only the traffic control data changes: the MEC traffic now breaks out at UPF3.
    let mut update = SmPolicyDecision::default();
    update.traffic_control.insert(
        "tc-mec".to_string(),
        TrafficControlData {
            id: "tc-mec".to_string(),
            route_to_location: Some(RouteToLocation {
                dnai: "edge".to_string(),
                route_profile: Some("mec-profile".to_string()),
            }),
        },
    );
    let task = spawn_modify(&smf, &response.reference, SessionDelta::PolicyUpdate(update));
    for upf in [&upf1, &upf2] {
        let changes = upf.handle_session_modification().await?;
        assert_eq!(changes.remove_pdrs.len(), 2);
        assert_eq!(changes.create_pdrs.len(), 2);
    }
    let changes = upf3.handle_session_modification().await?;
    assert_eq!(changes.create_pdrs.len(), 2);
    let uplink = changes
        .create_pdrs
        .iter()
        .find(|p| p.pdi.source_interface == SourceInterface::Access)
        .unwrap();
    assert_eq!(uplink.precedence, 100);
    let far = changes
        .create_fars
        .iter()
        .find(|f| f.far_id == uplink.far_id)
        .unwrap();
    assert_eq!(
        far.forwarding_parameters
            .as_ref()
            .unwrap()
            .forwarding_policy_id
            .as_deref(),
        Some("fwd-mec")
    );
    let changes = upf4.handle_session_modification().await?;
    assert_eq!(changes.remove_pdrs.len(), 2);
    assert!(changes.create_pdrs.is_empty());
    task.await?;

    assert_eq!(
        notifications.recv().await?,
        SmfNotification::UpPathChange {
            reference: response.reference.clone(),
            pcc_rule_id: "pcc-mec".to_string(),
            source_dnai: Some("mec".to_string()),
            target_dnai: Some("edge".to_string()),
        }
    );
    let info = smf.session_info(&response.reference).await.unwrap();
    assert_eq!(
        info.data_paths,
        vec![vec!["UPF1", "UPF2", "UPF3"], vec!["UPF1", "UPF2", "UPF3"]]
    );
    assert!(info.ulcl.is_none());

    release(&smf, &response.reference, &[&upf1, &upf2, &upf3, &upf4]).await
}

#[async_std::test]
async fn application_rule_takes_flow_from_pfd() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let response = establish_default_session(&smf, &upfs).await?;
    let [upf1, upf2, upf3, upf4] = &upfs;
    let notifications = smf.notifications();

    let task = spawn_modify(
        &smf,
        &response.reference,
        SessionDelta::PolicyUpdate(update_with(video_rule())),
    );
    for upf in [upf1, upf2, upf3] {
        let changes = upf.handle_session_modification().await?;
        let flows: Vec<&str> = changes
            .create_pdrs
            .iter()
            .filter_map(|p| p.pdi.sdf_filter.as_ref())
            .map(|f| f.flow_description.as_str())
            .collect();
        assert_eq!(flows.len(), 2);
        assert!(flows.contains(&"permit out 17 from 198.51.100.0/24 to assigned"));
        assert!(flows.contains(&"permit out 17 from assigned to 198.51.100.0/24"));
    }
    task.await?;
    upf4.expect_nothing().await?;

    // The rule stays on the session anchor, so no path change.
    assert!(notifications.try_recv().is_err());
    Ok(())
}

#[async_std::test]
async fn rule_without_flow_information_is_rejected() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let response = establish_default_session(&smf, &upfs).await?;

    let mut no_flow = video_rule();
    no_flow.app_id = None;
    let mut unknown_app = video_rule();
    unknown_app.app_id = Some("gaming".to_string());
    for rule in [no_flow, unknown_app] {
        let e = smf
            .modify_session(&response.reference, SessionDelta::PolicyUpdate(update_with(rule)))
            .await
            .unwrap_err();
        assert!(matches!(
            e.downcast_ref::<SmfError>(),
            Some(SmfError::InvalidPolicy(_))
        ));
        assert_eq!(cause_of(&e), Cause5gsm::RequestRejectedUnspecified);
    }
    upfs[0].expect_nothing().await?;

    // The session is untouched.
    let info = smf.session_info(&response.reference).await.unwrap();
    assert_eq!(info.state, SmContextState::Active);
    assert_eq!(info.data_paths, vec![vec!["UPF1", "UPF2", "UPF3"]]);
    Ok(())
}

#[async_std::test]
async fn creation_with_rule_without_flow_information_fails() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let mut policy = mec_policy();
    if let Some(rule) = policy.pcc_rules.get_mut("pcc-mec") {
        rule.flow_description = None;
    }
    let e = smf
        .create_session(create_request(SUPI, policy))
        .await
        .unwrap_err();
    assert_eq!(cause_of(&e), Cause5gsm::RequestRejectedUnspecified);
    assert_eq!(smf.session_count(), 0);
    upfs[0].expect_nothing().await
}
