mod announcements;
mod locations;
mod matches;
mod messages;
mod needs;
mod notifications;
mod offers;
mod users;

pub use announcements::AnnouncementFilter;
pub use locations::LocationFilter;
pub use matches::MatchOwners;
pub use needs::NeedFilter;
pub use notifications::NewNotification;
pub use offers::OfferFilter;
pub use users::UserFilter;

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> anyhow::Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> anyhow::Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// `?1, ?2, ...` for an `IN (...)` list starting at parameter `first`.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
