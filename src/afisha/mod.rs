//! Client for the Yandex Afisha API and event pages.

pub mod api;
pub mod errors;
pub mod json;
pub mod models;
pub mod paging;
pub mod site;

pub use api::{AfishaApi, PlacesParams, RepertoryParams, ScheduleCinemaParams};
pub use errors::AfishaApiError;
pub use paging::{PagingError, PagingState, paging_load};
pub use site::{EventPage, EventPages};
