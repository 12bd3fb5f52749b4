use anyhow::Result;
use pfcp::{CreateFar, CreatePdr, SessionEstablishmentRequest, SourceInterface};
use smf::{SessionDelta, SmPolicyDecision, SmfEvent};
use smf_tests::framework::*;

fn uplink_pdrs(r: &SessionEstablishmentRequest) -> Vec<&CreatePdr> {
    r.create_pdrs
        .iter()
        .filter(|p| p.pdi.source_interface == SourceInterface::Access)
        .collect()
}

fn far_of<'a>(r: &'a SessionEstablishmentRequest, pdr: &CreatePdr) -> &'a CreateFar {
    r.create_fars.iter().find(|f| f.far_id == pdr.far_id).unwrap()
}

#[async_std::test]
async fn mec_traffic_branches_at_uplink_classifier() -> Result<()> {
    let (smf, [upf1, upf2, upf3, upf4], _logger) = init().await?;
    let task = spawn_create(&smf, create_request(SUPI, mec_policy()));

    // UPF1 and UPF2 carry both the default and the MEC data path.
    let r1 = upf1.handle_session_establishment().await?;
    assert_eq!(r1.create_pdrs.len(), 4);
    let r2 = upf2.handle_session_establishment().await?;
    assert_eq!(r2.create_pdrs.len(), 4);
    let r3 = upf3.handle_session_establishment().await?;
    assert_eq!(r3.create_pdrs.len(), 2);

    // The MEC anchor enforces the session AMBR and the MEC QoS, and applies the route profile.
    let r4 = upf4.handle_session_establishment().await?;
    assert_eq!(r4.create_pdrs.len(), 2);
    assert_eq!(r4.create_qers.len(), 2);
    let mut qfis: Vec<u8> = r4.create_qers.iter().map(|q| q.qfi).collect();
    qfis.sort();
    assert_eq!(qfis, vec![5, 9]);
    let uplink = uplink_pdrs(&r4)[0];
    assert_eq!(uplink.precedence, 100);
    assert_eq!(
        uplink.pdi.sdf_filter.as_ref().unwrap().flow_description,
        "permit out ip from assigned to 10.100.0.0/16"
    );
    assert_eq!(uplink.qer_ids.len(), 2);
    let forwarding = far_of(&r4, uplink).forwarding_parameters.as_ref().unwrap();
    assert_eq!(forwarding.forwarding_policy_id.as_deref(), Some("fwd-mec"));

    // At the uplink classifier the MEC filter wins over the default path.
    let mut precedences: Vec<u32> = uplink_pdrs(&r2).iter().map(|p| p.precedence).collect();
    precedences.sort();
    assert_eq!(precedences, vec![100, 255]);

    let response = task.await?;
    assert_eq!(response.anchor, "UPF3");

    let (reply, replies) = async_channel::bounded(1);
    smf.handle_event(SmfEvent::SessionInfoQuery {
        reference: response.reference.clone(),
        reply,
    });
    let info = replies.recv().await?.unwrap();
    assert_eq!(info.ulcl.as_deref(), Some("UPF2"));
    assert_eq!(info.data_paths.len(), 2);
    assert!(info.data_paths.contains(&vec![
        "UPF1".to_string(),
        "UPF2".to_string(),
        "UPF4".to_string()
    ]));

    // Withdrawing the PCC rule takes the MEC path down again.
    let mut update = SmPolicyDecision::default();
    update.removed_pcc_rules.push("pcc-mec".to_string());
    smf.handle_event(SmfEvent::PolicyUpdateNotify {
        reference: response.reference.clone(),
        decision: update,
    });
    for upf in [&upf1, &upf2] {
        let changes = upf.handle_session_modification().await?;
        assert_eq!(changes.remove_pdrs.len(), 2);
        assert_eq!(changes.remove_fars.len(), 2);
        assert!(changes.create_pdrs.is_empty());
    }
    let changes = upf4.handle_session_modification().await?;
    assert_eq!(changes.remove_pdrs.len(), 2);
    assert_eq!(changes.remove_qers.len(), 2);
    upf3.expect_nothing().await?;

    let info = smf.session_info(&response.reference).await.unwrap();
    assert_eq!(info.data_paths, vec![vec!["UPF1", "UPF2", "UPF3"]]);
    assert!(info.ulcl.is_none());

    // UPF4 keeps its PFCP session until the PDU session is released.
    release(&smf, &response.reference, &[&upf1, &upf2, &upf3, &upf4]).await?;
    assert_eq!(smf.session_count(), 0);
    Ok(())
}

#[async_std::test]
async fn pcc_rule_without_steering_stays_on_session_anchor() -> Result<()> {
    let (smf, upfs, _logger) = init().await?;
    let response = establish_default_session(&smf, &upfs).await?;
    let [upf1, upf2, upf3, upf4] = &upfs;

    let mut update = SmPolicyDecision::default();
    let mut rule = mec_pcc_rule();
    rule.id = "pcc-video".to_string();
    rule.traffic_control = None;
    rule.qos_data = None;
    update.pcc_rules.insert(rule.id.clone(), rule);
    let task = spawn_modify(&smf, &response.reference, SessionDelta::PolicyUpdate(update));
    for upf in [upf1, upf2, upf3] {
        let changes = upf.handle_session_modification().await?;
        assert_eq!(changes.create_pdrs.len(), 2);
        assert!(changes.create_pdrs.iter().all(|p| p.pdi.sdf_filter.is_some()));
    }
    task.await?;
    upf4.expect_nothing().await?;

    let info = smf.session_info(&response.reference).await.unwrap();
    assert_eq!(info.data_paths.len(), 2);
    assert!(info.ulcl.is_none());
    Ok(())
}
