#![allow(missing_docs)]

pub mod analytics;
pub mod clock;
pub mod engine;
pub mod error;
pub mod navigation;
pub mod session;
pub mod submission;
pub mod transport;
pub mod view;

pub use analytics::{AnalyticsEvent, AnalyticsTracker, EventKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Change, Delivery, Engine, EngineOptions, Progress, Step};
pub use error::{EngineError, SubmitError, TransportError};
pub use navigation::{NavState, Navigator, Transition};
pub use session::SessionId;
pub use submission::{Submission, SubmissionMetadata, build_submission};
pub use transport::{
    AnalyticsSink, HttpTransport, MemoryTransport, NullTransport, SubmissionTransport,
};
pub use view::{QuestionView, StepView, ViewStatus, build_step_view, render_json, render_text};
