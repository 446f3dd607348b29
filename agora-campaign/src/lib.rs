pub mod brackets;
pub mod campaign;
pub mod store;

pub use brackets::{resolve_bracket, unit_price_for_quantity, validate_brackets, DiscountBracket, PricingError};
pub use campaign::{Campaign, CampaignError, CampaignStatus};
pub use store::{CampaignStore, InMemoryCampaignStore};
