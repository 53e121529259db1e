//! Database entities.

pub mod activity;
pub mod drawing;
pub mod drawing_revision;
pub mod drawing_type;
pub mod element;
pub mod element_type;
pub mod element_type_bom;
pub mod element_type_path;
pub mod element_type_quantity;
pub mod element_type_revision;
pub mod hierarchy_quantity;
pub mod import_job;
pub mod inv_bom;
pub mod precast;
pub mod precast_stock;
pub mod project_stage;

pub use activity::Entity as Activity;
pub use drawing::Entity as Drawing;
pub use drawing_revision::Entity as DrawingRevision;
pub use drawing_type::Entity as DrawingType;
pub use element::Entity as Element;
pub use element_type::Entity as ElementType;
pub use element_type_bom::Entity as ElementTypeBom;
pub use element_type_path::Entity as ElementTypePath;
pub use element_type_quantity::Entity as ElementTypeQuantity;
pub use element_type_revision::Entity as ElementTypeRevision;
pub use hierarchy_quantity::Entity as HierarchyQuantity;
pub use import_job::{Entity as ImportJob, JobStatus};
pub use inv_bom::Entity as InvBom;
pub use precast::Entity as Precast;
pub use precast_stock::Entity as PrecastStock;
pub use project_stage::Entity as ProjectStage;
