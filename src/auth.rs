//! Identity and capability checks.
//!
//! Token issuance and verification live in the identity gateway upstream of
//! this service; requests arrive with the authenticated subject and its
//! granted permission strings in trusted headers. Every mutating operation
//! calls [`CurrentUser::require`] with the capability it needs.

use crate::errors::ServiceError;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::collections::HashSet;

const USER_ID_HEADER: &str = "x-user-id";
const USER_NAME_HEADER: &str = "x-user-name";
const PERMISSIONS_HEADER: &str = "x-user-permissions";

/// Permission string constants for compile-time safety.
pub mod permissions {
    pub const INVENTARIO_VER: &str = "inventario:ver";
    pub const INVENTARIO_MOVER: &str = "inventario:mover";

    pub const RESERVAS_CREAR: &str = "reservas:crear";
    pub const RESERVAS_LIBERAR: &str = "reservas:liberar";
    pub const RESERVAS_APLICAR: &str = "reservas:aplicar";

    pub const COMPRAS_GESTIONAR: &str = "compras:gestionar";
    pub const COMPRAS_RECIBIR: &str = "compras:recibir";

    pub const PRECIOS_CAMBIAR: &str = "precios:cambiar";
    pub const PRECIOS_RECALCULAR: &str = "precios:recalcular";

    pub const FINANZAS_TIPOS_CAMBIO: &str = "finanzas:tipos-cambio";

    /// Grants every capability.
    pub const ALL: &str = "*";
}

/// The authenticated caller of the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    permissions: HashSet<String>,
}

impl CurrentUser {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        granted: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            permissions: granted.into_iter().collect(),
        }
    }

    /// Capability check: `(identity, permission) -> bool`.
    pub fn can(&self, permission: &str) -> bool {
        if self.permissions.contains(permissions::ALL) {
            return true;
        }
        if self.permissions.contains(permission) {
            return true;
        }
        // "resource:*" grants every action on the resource
        permission
            .split_once(':')
            .map(|(resource, _)| self.permissions.contains(&format!("{resource}:*")))
            .unwrap_or(false)
    }

    /// Fails with `Forbidden` unless the caller holds the capability.
    pub fn require(&self, permission: &str) -> Result<(), ServiceError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "missing permission {permission}"
            )))
        }
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let id = header(USER_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("missing identity headers".into()))?;
        let name = header(USER_NAME_HEADER).unwrap_or_else(|| id.clone());
        let granted = header(PERMISSIONS_HEADER)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        Ok(CurrentUser::new(id, name, granted))
    }
}
