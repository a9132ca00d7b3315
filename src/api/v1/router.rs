use super::handler;
use crate::application_impl::SessionRegistry;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    registry: Arc<SessionRegistry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let list = warp::get()
        .and(warp::path("sessions"))
        .and(warp::path::end())
        .and(with(registry.clone()))
        .and_then(handler::list_sessions);

    let status = warp::get()
        .and(warp::path!("sessions" / String))
        .and(with(registry.clone()))
        .and_then(handler::session_status);

    let ensure_fresh = warp::post()
        .and(warp::path!("sessions" / String / "ensure-fresh"))
        .and(with(registry.clone()))
        .and_then(handler::ensure_fresh);

    let start = warp::post()
        .and(warp::path!("sessions" / String / "monitor"))
        .and(with(registry.clone()))
        .and_then(handler::start_monitoring);

    let stop = warp::delete()
        .and(warp::path!("sessions" / String / "monitor"))
        .and(with(registry))
        .and_then(handler::stop_monitoring);

    list.or(status).or(ensure_fresh).or(start).or(stop)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}
