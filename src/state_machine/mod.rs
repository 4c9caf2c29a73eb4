// State machines for the calculation engine
//
// Tasks move Processing -> Completed and never fail; worker slots alternate
// between Idle and Busy until they are removed from the pool.

pub mod events;
pub mod states;
pub mod transitions;

pub use events::{TaskEvent, WorkerEvent};
pub use states::{TaskState, WorkerState};
pub use transitions::{next_task_state, next_worker_state, StateTransitionError};
