use sqlx::{PgPool, Row};
use tally_core::{Role, SmeProfile, User};
use tracing::{info, warn};

use crate::contracts::{
    AuthResponse, ChangePasswordRequest, CreateCompanyRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest,
};
use crate::error::{ServiceError, ServiceResult, unique_or};
use crate::password::{hash_password_blocking, validate_new_password, verify_password_blocking};
use crate::schema::{USER_CREDENTIALS, USERS};
use crate::services::company::{insert_company, seed_chart};
use crate::services::user::{parse_role, user_from_row};
use crate::services::{normalize_email, optional_text, required_text};
use crate::token::TokenSigner;

const BAD_CREDENTIALS: &str = "invalid email or password";

enum Membership {
    NewCompany(String),
    Existing(i64),
}

/// Login, registration and password management on top of the token signer.
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    signer: TokenSigner,
}

impl AuthService {
    pub fn new(pool: PgPool, signer: TokenSigner) -> Self {
        Self { pool, signer }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub async fn login(&self, request: LoginRequest) -> ServiceResult<AuthResponse> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(ServiceError::invalid("email and password are required"));
        }
        let email = request.email.trim().to_ascii_lowercase();

        let sql = format!(
            "SELECT {}, password_hash FROM users WHERE email = $1",
            USERS.select_list()
        );
        let Some(row) = sqlx::query(&sql)
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Err(ServiceError::unauthorized(BAD_CREDENTIALS));
        };

        let user = user_from_row(&row)?;
        let stored_hash: Option<String> = row.try_get("password_hash")?;
        let Some(stored_hash) = stored_hash.filter(|_| user.is_active) else {
            warn!(user_id = user.id, "login refused for inactive or passwordless user");
            return Err(ServiceError::unauthorized(BAD_CREDENTIALS));
        };
        if !verify_password_blocking(request.password, stored_hash).await? {
            return Err(ServiceError::unauthorized(BAD_CREDENTIALS));
        }

        let sql = format!(
            "UPDATE users SET last_login = NOW() WHERE id = $1 RETURNING {}",
            USERS.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(user.id)
            .fetch_one(&self.pool)
            .await?;
        let user = user_from_row(&row)?;
        let token = self.signer.issue(&user)?;

        info!(user_id = user.id, company_id = user.company_id, "user logged in");
        Ok(AuthResponse { user, token })
    }

    /// Registers into an existing company, or creates a new company (with its
    /// default chart) whose first user is an admin. The whole registration is
    /// one transaction.
    ///
    /// Joining an existing company needs `sponsor`: an admin of that company.
    pub async fn register(
        &self,
        request: RegisterRequest,
        sponsor: Option<&User>,
    ) -> ServiceResult<AuthResponse> {
        let email = normalize_email(&request.email)?;
        validate_new_password(&request.password)
            .map_err(|err| ServiceError::invalid(err.to_string()))?;
        let first_name = required_text(&request.first_name, "firstName")?;
        let last_name = required_text(&request.last_name, "lastName")?;
        let company_name = optional_text(request.company_name);

        let (membership, role) = match (company_name, request.company_id) {
            (Some(name), _) => (Membership::NewCompany(name), Role::Admin),
            (None, Some(company_id)) => {
                let sponsored = sponsor
                    .is_some_and(|admin| admin.role.is_admin() && admin.company_id == company_id);
                if !sponsored {
                    return Err(ServiceError::unauthorized(
                        "joining an existing company requires an admin of that company",
                    ));
                }
                (Membership::Existing(company_id), parse_role(request.role.as_deref())?)
            }
            (None, None) => {
                return Err(ServiceError::invalid("companyId or companyName is required"));
            }
        };

        let password_hash = hash_password_blocking(request.password).await?;

        let mut tx = self.pool.begin().await?;
        let company_id = match membership {
            Membership::NewCompany(name) => {
                let company_id = insert_company(
                    &mut tx,
                    CreateCompanyRequest {
                        name,
                        ..CreateCompanyRequest::default()
                    },
                )
                .await?;
                seed_chart(&mut tx, company_id, &SmeProfile).await?;
                company_id
            }
            Membership::Existing(company_id) => {
                let exists = sqlx::query("SELECT 1 FROM companies WHERE id = $1")
                    .bind(company_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .is_some();
                if !exists {
                    return Err(ServiceError::NotFound("company"));
                }
                company_id
            }
        };

        let sql = format!(
            r#"
            INSERT INTO users (company_id, email, password_hash, first_name, last_name, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USERS.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(company_id)
            .bind(&email)
            .bind(&password_hash)
            .bind(&first_name)
            .bind(&last_name)
            .bind(role.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| unique_or(err, format!("user with email {email} already exists")))?;
        let user = user_from_row(&row)?;

        tx.commit().await?;

        let token = self.signer.issue(&user)?;
        info!(user_id = user.id, company_id, role = role.as_str(), "user registered");
        Ok(AuthResponse { user, token })
    }

    /// Checks the token and that its user still exists and is active.
    pub async fn authenticate(&self, token: &str) -> ServiceResult<User> {
        let claims = self.signer.verify(token)?;
        let user = crate::services::user::by_id(&self.pool, claims.id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| ServiceError::unauthorized("user is inactive or no longer exists"))?;

        Ok(user)
    }

    pub async fn change_password(
        &self,
        user: &User,
        request: ChangePasswordRequest,
    ) -> ServiceResult<()> {
        if request.current_password.is_empty() {
            return Err(ServiceError::invalid("currentPassword is required"));
        }
        validate_new_password(&request.new_password)
            .map_err(|err| ServiceError::invalid(err.to_string()))?;

        let sql = format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_CREDENTIALS.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(user.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        let stored_hash: Option<String> = row.try_get("password_hash")?;
        let verified = match stored_hash {
            Some(stored_hash) => {
                verify_password_blocking(request.current_password, stored_hash).await?
            }
            None => false,
        };
        if !verified {
            return Err(ServiceError::unauthorized("current password is incorrect"));
        }

        self.store_password(user.id, request.new_password).await?;
        info!(user_id = user.id, "password changed");
        Ok(())
    }

    /// Admins reset passwords for users of their own company.
    pub async fn reset_password(
        &self,
        admin: &User,
        request: ResetPasswordRequest,
    ) -> ServiceResult<()> {
        if !admin.role.is_admin() {
            return Err(ServiceError::unauthorized("admin role required"));
        }
        let email = normalize_email(&request.email)?;
        validate_new_password(&request.new_password)
            .map_err(|err| ServiceError::invalid(err.to_string()))?;

        let target: i64 = sqlx::query("SELECT id FROM users WHERE email = $1 AND company_id = $2")
            .bind(&email)
            .bind(admin.company_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("user"))?
            .try_get("id")?;

        self.store_password(target, request.new_password).await?;
        info!(admin_id = admin.id, user_id = target, "password reset");
        Ok(())
    }

    async fn store_password(&self, user_id: i64, password: String) -> ServiceResult<()> {
        let password_hash = hash_password_blocking(password).await?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
