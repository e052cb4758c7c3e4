pub mod chat_completion;
pub mod extract;
pub mod health;
pub mod provider;
pub mod routing;
pub mod usage;

pub use chat_completion::handle_chat_completion;

pub use extract::ApiJson;

pub use provider::{
    get_model_capabilities,
    get_provider,
    get_provider_health,
    list_providers,
    register_provider,
    remove_provider,
    update_provider,
    RegisterProviderRequest,
};

pub use routing::{get_routing_rules, get_settings, set_routing_rules, update_settings};

pub use health::check_all_providers_health;

pub use usage::{get_usage_statistics, UsageQuery};
