#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use segmentation_controller_core as core;
pub use segmentation_controller_k8s_api as k8s;
pub use segmentation_controller_k8s_status as status;

mod args;
mod metrics;
mod objects;
mod policy;
mod router;

pub use self::args::Args;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reconcile(#[from] core::reconcile::Error),

    #[error(transparent)]
    Fabric(#[from] core::fabric::Error),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Finalizer(Box<kube::runtime::finalizer::Error<Error>>),

    #[error("{0} has no namespace")]
    MissingObjectKey(String),
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(error: kube::runtime::finalizer::Error<Error>) -> Self {
        Self::Finalizer(Box::new(error))
    }
}
