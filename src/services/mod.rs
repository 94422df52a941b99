pub mod extensions;
pub mod loan_requests;
pub mod loans;
pub mod materials;

use crate::errors::ServiceError;
use sea_orm::TransactionError;

/// Flatten sea-orm transaction errors into the service taxonomy.
pub(crate) fn txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::Database(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}
