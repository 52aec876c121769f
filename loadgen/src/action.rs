//! The shopping actions a virtual user may perform.
//!
//! Each [`Action`] is one interaction with the storefront frontend, possibly
//! spanning several requests. Actions are independent of one another; none
//! carries state into the next. Sampling of products, currencies and
//! quantities draws from the caller's random source.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    encode,
    fixtures::{AddToCart, CURRENCIES, CheckoutForm, PRODUCTS, QUANTITIES, SetCurrency},
    target::{self, Transport},
    weighted::{self, Weighted},
};

/// Errors produced while performing an [`Action`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// See [`crate::encode::Error`] for details.
    #[error(transparent)]
    Encode(#[from] encode::Error),
    /// See [`crate::target::Error`] for details.
    #[error(transparent)]
    Target(#[from] target::Error),
}

/// A shopping action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// `GET /`
    Index,
    /// `POST /setCurrency` with a random currency
    SetCurrency,
    /// `GET /product/{id}` with a random product
    BrowseProduct,
    /// `GET /cart`
    ViewCart,
    /// View a random product then `POST /cart` with a random quantity of it
    AddToCart,
    /// [`Action::AddToCart`], then `POST /cart/checkout`, then pause one time
    /// unit
    Checkout,
}

impl Action {
    /// Every action, in catalog order.
    pub const ALL: [Action; 6] = [
        Action::Index,
        Action::SetCurrency,
        Action::BrowseProduct,
        Action::ViewCart,
        Action::AddToCart,
        Action::Checkout,
    ];

    /// The name used in logs and metric labels.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::SetCurrency => "set_currency",
            Action::BrowseProduct => "browse_product",
            Action::ViewCart => "view_cart",
            Action::AddToCart => "add_to_cart",
            Action::Checkout => "checkout",
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Relative weight of each [`Action`] in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct Weights {
    #[serde(default = "default_weight")]
    pub index: f64,
    #[serde(default = "default_weight")]
    pub set_currency: f64,
    #[serde(default = "default_weight")]
    pub browse_product: f64,
    #[serde(default = "default_weight")]
    pub view_cart: f64,
    #[serde(default = "default_weight")]
    pub add_to_cart: f64,
    #[serde(default = "default_weight")]
    pub checkout: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            index: default_weight(),
            set_currency: default_weight(),
            browse_product: default_weight(),
            view_cart: default_weight(),
            add_to_cart: default_weight(),
            checkout: default_weight(),
        }
    }
}

impl Weights {
    fn weight(&self, action: Action) -> f64 {
        match action {
            Action::Index => self.index,
            Action::SetCurrency => self.set_currency,
            Action::BrowseProduct => self.browse_product,
            Action::ViewCart => self.view_cart,
            Action::AddToCart => self.add_to_cart,
            Action::Checkout => self.checkout,
        }
    }
}

/// Build the weighted action catalog.
///
/// # Errors
///
/// Function will return an error if any weight is not finite and positive.
pub fn catalog(weights: &Weights) -> Result<Weighted<Action>, weighted::Error> {
    Weighted::new(
        Action::ALL
            .iter()
            .map(|action| (*action, weights.weight(*action)))
            .collect(),
    )
}

/// Everything an action needs to reach the storefront.
#[derive(Debug)]
pub struct Context<'a, T, C>
where
    T: ?Sized,
    C: ?Sized,
{
    /// Where requests go
    pub target: &'a T,
    /// Where pauses go
    pub clock: &'a C,
    /// Length of one pause unit
    pub time_unit: Duration,
}

impl<T, C> Context<'_, T, C>
where
    T: Transport + ?Sized,
    C: Clock + ?Sized,
{
    /// Perform `action` to completion, stopping at the first failed request.
    ///
    /// # Errors
    ///
    /// Function will return an error if any request the action makes fails in
    /// transport.
    pub async fn perform<R>(&self, action: Action, rng: &mut R) -> Result<(), Error>
    where
        R: Rng + Send + ?Sized,
    {
        match action {
            Action::Index => self.index().await,
            Action::SetCurrency => self.set_currency(rng).await,
            Action::BrowseProduct => self.browse_product(rng).await,
            Action::ViewCart => self.view_cart().await,
            Action::AddToCart => self.add_to_cart(rng).await,
            Action::Checkout => self.checkout(rng).await,
        }
    }

    async fn index(&self) -> Result<(), Error> {
        self.target.get("/").await?;
        Ok(())
    }

    async fn set_currency<R>(&self, rng: &mut R) -> Result<(), Error>
    where
        R: Rng + Send + ?Sized,
    {
        let currency_code = CURRENCIES[rng.random_range(0..CURRENCIES.len())];
        let body = encode::form(&SetCurrency { currency_code })?;
        self.target.post_form("/setCurrency", body).await?;
        Ok(())
    }

    async fn browse_product<R>(&self, rng: &mut R) -> Result<(), Error>
    where
        R: Rng + Send + ?Sized,
    {
        let product_id = PRODUCTS[rng.random_range(0..PRODUCTS.len())];
        self.target.get(&format!("/product/{product_id}")).await?;
        Ok(())
    }

    async fn view_cart(&self) -> Result<(), Error> {
        self.target.get("/cart").await?;
        Ok(())
    }

    async fn add_to_cart<R>(&self, rng: &mut R) -> Result<(), Error>
    where
        R: Rng + Send + ?Sized,
    {
        let product_id = PRODUCTS[rng.random_range(0..PRODUCTS.len())];
        let quantity = QUANTITIES[rng.random_range(0..QUANTITIES.len())];

        self.target.get(&format!("/product/{product_id}")).await?;
        let body = encode::form(&AddToCart {
            product_id,
            quantity,
        })?;
        self.target.post_form("/cart", body).await?;
        Ok(())
    }

    async fn checkout<R>(&self, rng: &mut R) -> Result<(), Error>
    where
        R: Rng + Send + ?Sized,
    {
        self.add_to_cart(rng).await?;

        let body = encode::form(&CheckoutForm::default())?;
        self.target.post_form("/cart/checkout", body).await?;

        self.clock.sleep(self.time_unit).await;
        Ok(())
    }
}
