pub mod audit_log;
pub mod category;
pub mod loan;
pub mod loan_extension;
pub mod loan_request;
pub mod loan_request_item;
pub mod location;
pub mod material;

pub use audit_log::Entity as AuditLog;
pub use category::Entity as Category;
pub use loan::Entity as Loan;
pub use loan_extension::Entity as LoanExtension;
pub use loan_request::Entity as LoanRequest;
pub use loan_request_item::Entity as LoanRequestItem;
pub use location::Entity as Location;
pub use material::Entity as Material;
