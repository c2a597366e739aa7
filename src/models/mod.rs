pub mod notification;
pub mod ticket;
pub mod user;

pub use notification::{Notification, NotificationKind};
pub use ticket::{NewTicket, Ticket, TicketStatus};
pub use user::User;
