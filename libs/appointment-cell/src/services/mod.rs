pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod validator;
pub mod window;

pub use booking::ConsultationBookingService;
pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
pub use validator::AppointmentValidator;
pub use window::TimeWindow;
