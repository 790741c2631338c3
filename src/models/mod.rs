pub mod delivery;
pub mod template;

pub use delivery::{
    AuthorityPayload, DeliveryJob, DeliveryStatus, FreeTextPayload, JobPayload, KakaoButton,
    NewDeliveryJob,
};
pub use template::AuthorityTemplateRow;
