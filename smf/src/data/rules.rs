//! rules - the PDR / FAR / QER / BAR of a session, each wrapping its PFCP representation
//! together with its installation state
use pfcp::{
    ApplyAction, Bitrate, CreateBar, CreateFar, CreatePdr, CreateQer, ForwardingParameters,
    GateStatus, Pdi, RemoveBar, RemoveFar, RemovePdr, RemoveQer, RuleChanges,
};

/// Whether a rule still has to be sent to its UPF, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Unchanged,
    Create,
    Update,
    Remove,
}

impl RuleState {
    fn updated(self) -> Self {
        match self {
            RuleState::Unchanged => RuleState::Update,
            other => other,
        }
    }

    fn committed(self) -> Self {
        match self {
            RuleState::Create | RuleState::Update => RuleState::Unchanged,
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bar {
    pub ie: CreateBar,
    pub state: RuleState,
}

#[derive(Debug, Clone)]
pub struct Far {
    pub ie: CreateFar,
    pub state: RuleState,
    pub bar: Option<Bar>,
}

impl Far {
    pub fn new(far_id: u32) -> Self {
        Far {
            ie: CreateFar {
                far_id,
                apply_action: ApplyAction::default(),
                forwarding_parameters: None,
                bar_id: None,
            },
            state: RuleState::Create,
            bar: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.ie.far_id
    }

    pub fn set_forwarding(&mut self, forwarding_parameters: ForwardingParameters) {
        self.ie.apply_action = ApplyAction::forward();
        self.ie.forwarding_parameters = Some(forwarding_parameters);
    }

    pub fn forwarding_parameters_mut(&mut self) -> &mut ForwardingParameters {
        self.ie
            .forwarding_parameters
            .get_or_insert_with(ForwardingParameters::default)
    }

    pub fn set_bar(&mut self, bar_id: u8) {
        self.ie.bar_id = Some(bar_id);
        self.bar = Some(Bar {
            ie: CreateBar {
                bar_id,
                suggested_buffering_packets_count: None,
            },
            state: RuleState::Create,
        });
    }

    pub fn mark_updated(&mut self) {
        self.state = self.state.updated();
    }
}

#[derive(Debug, Clone)]
pub struct Qer {
    pub ie: CreateQer,
    pub state: RuleState,
}

impl Qer {
    pub fn new(qer_id: u32, qfi: u8, mbr: Option<Bitrate>, gbr: Option<Bitrate>) -> Self {
        Qer {
            ie: CreateQer {
                qer_id,
                qfi,
                gate_status: GateStatus::Open,
                mbr,
                gbr,
            },
            state: RuleState::Create,
        }
    }

    pub fn id(&self) -> u32 {
        self.ie.qer_id
    }

    pub fn mark_updated(&mut self) {
        self.state = self.state.updated();
    }
}

/// A PDR and the FAR it owns.
#[derive(Debug, Clone)]
pub struct Pdr {
    pub ie: CreatePdr,
    pub state: RuleState,
    pub far: Far,
}

impl Pdr {
    pub fn new(pdr_id: u16, far_id: u32, precedence: u32) -> Self {
        Pdr {
            ie: CreatePdr {
                pdr_id,
                precedence,
                pdi: Pdi::default(),
                outer_header_removal: None,
                far_id,
                qer_ids: vec![],
            },
            state: RuleState::Create,
            far: Far::new(far_id),
        }
    }

    pub fn id(&self) -> u16 {
        self.ie.pdr_id
    }

    pub fn mark_updated(&mut self) {
        self.state = self.state.updated();
    }

    /// Marks this PDR and the rules it owns for removal.
    pub fn mark_removed(&mut self) {
        self.state = RuleState::Remove;
        self.far.state = RuleState::Remove;
        if let Some(bar) = self.far.bar.as_mut() {
            bar.state = RuleState::Remove;
        }
    }

    pub fn commit(&mut self) {
        self.state = self.state.committed();
        self.far.state = self.far.state.committed();
        if let Some(bar) = self.far.bar.as_mut() {
            bar.state = bar.state.committed();
        }
    }

    pub fn collect_changes(&self, changes: &mut RuleChanges) {
        match self.state {
            RuleState::Create => changes.create_pdrs.push(self.ie.clone()),
            RuleState::Update => changes.update_pdrs.push(self.ie.clone()),
            RuleState::Remove => changes.remove_pdrs.push(RemovePdr {
                pdr_id: self.ie.pdr_id,
            }),
            RuleState::Unchanged => (),
        }
        match self.far.state {
            RuleState::Create => changes.create_fars.push(self.far.ie.clone()),
            RuleState::Update => changes.update_fars.push(self.far.ie.clone()),
            RuleState::Remove => changes.remove_fars.push(RemoveFar {
                far_id: self.far.ie.far_id,
            }),
            RuleState::Unchanged => (),
        }
        if let Some(bar) = &self.far.bar {
            match bar.state {
                RuleState::Create => changes.create_bars.push(bar.ie),
                RuleState::Remove => changes.remove_bars.push(RemoveBar {
                    bar_id: bar.ie.bar_id,
                }),
                RuleState::Update | RuleState::Unchanged => (),
            }
        }
    }
}

pub fn collect_qer_changes(qer: &Qer, changes: &mut RuleChanges) {
    match qer.state {
        RuleState::Create => changes.create_qers.push(qer.ie),
        RuleState::Update => changes.update_qers.push(qer.ie),
        RuleState::Remove => changes.remove_qers.push(RemoveQer {
            qer_id: qer.ie.qer_id,
        }),
        RuleState::Unchanged => (),
    }
}
