use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use ca_types::{
    CartItem, CartResponse, CheckoutResponse, EnrollRequest, Enrollment, EnrollmentListResponse,
    ProgressRequest, ProgressResponse,
};
use ca_wallet_core::checkout;

use crate::{AppState, ApiResult, bad_request, json_body, wallet_error};

pub(crate) async fn cart_get(State(state): State<AppState>) -> ApiResult<CartResponse> {
    let items = state.checkout.cart().await.map_err(wallet_error)?;
    Ok(Json(cart_response(items)))
}

pub(crate) async fn cart_add(
    State(state): State<AppState>,
    payload: Result<Json<CartItem>, JsonRejection>,
) -> ApiResult<CartResponse> {
    let item = json_body(payload)?;
    if item.title.trim().is_empty() {
        return Err(bad_request("title is required"));
    }
    let items = state
        .checkout
        .add_to_cart(item)
        .await
        .map_err(wallet_error)?;
    Ok(Json(cart_response(items)))
}

pub(crate) async fn cart_remove(
    State(state): State<AppState>,
    Path(course_id): Path<u64>,
) -> ApiResult<CartResponse> {
    let items = state
        .checkout
        .remove_from_cart(course_id)
        .await
        .map_err(wallet_error)?;
    Ok(Json(cart_response(items)))
}

pub(crate) async fn cart_clear(State(state): State<AppState>) -> ApiResult<CartResponse> {
    state.checkout.clear_cart().await.map_err(wallet_error)?;
    Ok(Json(cart_response(Vec::new())))
}

pub(crate) async fn cart_checkout(State(state): State<AppState>) -> ApiResult<CheckoutResponse> {
    let receipt = state.checkout.checkout().await.map_err(wallet_error)?;
    Ok(Json(CheckoutResponse {
        transaction: receipt.transaction,
        enrollments: receipt.enrollments,
    }))
}

pub(crate) async fn course_enroll(
    State(state): State<AppState>,
    Path(course_id): Path<u64>,
    payload: Result<Json<EnrollRequest>, JsonRejection>,
) -> ApiResult<Enrollment> {
    let request = json_body(payload)?;
    if request.title.trim().is_empty() {
        return Err(bad_request("title is required"));
    }
    let enrollment = state
        .checkout
        .enroll(CartItem {
            course_id,
            title: request.title,
            price: request.price,
        })
        .await
        .map_err(wallet_error)?;
    Ok(Json(enrollment))
}

pub(crate) async fn enrollments(State(state): State<AppState>) -> ApiResult<EnrollmentListResponse> {
    let enrollments = state.checkout.enrollments().await.map_err(wallet_error)?;
    Ok(Json(EnrollmentListResponse { enrollments }))
}

pub(crate) async fn progress_get(
    State(state): State<AppState>,
    Path(course_id): Path<u64>,
) -> ApiResult<ProgressResponse> {
    let percent = state
        .checkout
        .progress(course_id)
        .await
        .map_err(wallet_error)?;
    Ok(Json(ProgressResponse { course_id, percent }))
}

pub(crate) async fn progress_set(
    State(state): State<AppState>,
    Path(course_id): Path<u64>,
    payload: Result<Json<ProgressRequest>, JsonRejection>,
) -> ApiResult<ProgressResponse> {
    let request = json_body(payload)?;
    state
        .checkout
        .set_progress(course_id, request.percent)
        .await
        .map_err(wallet_error)?;
    Ok(Json(ProgressResponse {
        course_id,
        percent: request.percent,
    }))
}

fn cart_response(items: Vec<CartItem>) -> CartResponse {
    CartResponse {
        total: checkout::total(&items),
        items,
    }
}
