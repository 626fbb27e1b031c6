mod builtins;
pub mod callsite;
pub mod category;
pub mod clock;
pub mod config;
pub mod error;
pub mod ext;
pub mod meta;
pub mod method;
pub mod plan;
pub mod realm;
pub mod rt;
pub mod typ;
pub mod val;

#[cfg(test)]
mod config_test;

pub use callsite::{CallSite, CallSiteArray, CallSiteStats, SiteKind};
pub use category::{Category, CategoryScope, use_category, use_categories};
pub use config::DispatchConfig;
pub use error::{DispatchError, ModuleError};
pub use meta::{MetaClass, Operator, Resolved};
pub use method::{MethodDescriptor, MethodRegistry, Visibility};
pub use plan::{CallPlan, CallShape, DispatchPlanner, StaticType};
pub use realm::Realm;
pub use rt::Runtime;
pub use typ::{ClassBuilder, ClassRef, builtins};
pub use val::Val;
