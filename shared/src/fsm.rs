use rust_fsm::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaceState {
    Idle,
    Racing,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaceEvent {
    Start,
    AllSettled,
    Reset,
}

impl StateMachineImpl for RaceState {
    type Input = RaceEvent;
    type State = RaceState;
    type Output = ();
    const INITIAL_STATE: Self::State = RaceState::Idle;

    fn transition(state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        match (state, input) {
            (RaceState::Idle, RaceEvent::Start) => Some(RaceState::Racing),
            (RaceState::Finished, RaceEvent::Start) => Some(RaceState::Racing),
            (RaceState::Racing, RaceEvent::AllSettled) => Some(RaceState::Finished),
            (_, RaceEvent::Reset) => Some(RaceState::Idle),
            _ => None,
        }
    }

    fn output(_state: &Self::State, _input: &Self::Input) -> Option<Self::Output> {
        None
    }
}

impl Default for RaceState {
    fn default() -> Self {
        RaceState::Idle
    }
}
