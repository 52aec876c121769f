//! The currency service over gRPC.
//!
//! Only `GetSupportedCurrencies` is called. The request and response messages
//! are declared here by hand, matching `hipstershop.Empty` and
//! `hipstershop.GetSupportedCurrenciesResponse` in the storefront's
//! `demo.proto`, which this project does not own.

use std::time::Duration;

use http::{Uri, uri::PathAndQuery};
use tonic::{
    Request,
    codec::ProstCodec,
    transport::{Channel, Endpoint},
};
use tracing::debug;

/// Fully qualified path of the supported currencies method.
pub const GET_SUPPORTED_CURRENCIES: &str = "/hipstershop.CurrencyService/GetSupportedCurrencies";

/// Errors produced by [`CurrencyClient`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The remote RPC endpoint returned an error.
    #[error("RPC endpoint error: {0}")]
    Rpc(#[from] tonic::Status),
    /// gRPC transport error
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// `hipstershop.Empty`
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Empty {}

/// `hipstershop.GetSupportedCurrenciesResponse`
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetSupportedCurrenciesResponse {
    /// ISO 4217 codes the currency service can convert between
    #[prost(string, repeated, tag = "1")]
    pub currency_codes: Vec<String>,
}

/// A plaintext connection to the currency service.
#[derive(Debug)]
pub struct CurrencyClient {
    inner: tonic::client::Grpc<Channel>,
}

impl CurrencyClient {
    /// Establish a plaintext connection to `addr`.
    ///
    /// # Errors
    ///
    /// Function will return an error if the connection cannot be established
    /// within `connect_timeout`.
    pub async fn connect(addr: Uri, connect_timeout: Duration) -> Result<Self, Error> {
        let endpoint = Endpoint::from(addr).connect_timeout(connect_timeout);
        let channel = endpoint.connect().await?;
        debug!("currency client connected");

        Ok(Self {
            inner: tonic::client::Grpc::new(channel),
        })
    }

    /// Ask the currency service which currencies it supports.
    ///
    /// # Errors
    ///
    /// Function will return an error if the service is not ready or answers
    /// with a non-OK status.
    pub async fn get_supported_currencies(
        &mut self,
    ) -> Result<GetSupportedCurrenciesResponse, Error> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::new(tonic::Code::Unknown, format!("Service was not ready: {e}"))
        })?;

        let codec: ProstCodec<Empty, GetSupportedCurrenciesResponse> = ProstCodec::default();
        let response = self
            .inner
            .unary(
                Request::new(Empty {}),
                PathAndQuery::from_static(GET_SUPPORTED_CURRENCIES),
                codec,
            )
            .await?;

        Ok(response.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        convert::Infallible,
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        task::{Context, Poll},
        time::Duration,
    };

    use tonic::{
        body::Body,
        codec::ProstCodec,
        codegen::{BoxFuture, Service},
        server::{Grpc, NamedService, UnaryService},
    };

    use super::{Empty, GET_SUPPORTED_CURRENCIES, GetSupportedCurrenciesResponse};

    /// A currency service answering only `GetSupportedCurrencies`, counting
    /// the calls it serves.
    #[derive(Debug, Clone)]
    pub(crate) struct CurrencyService {
        codes: Vec<String>,
        calls: Arc<AtomicUsize>,
    }

    impl CurrencyService {
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Serve `codes` on a local port until the test ends.
        pub(crate) async fn spawn(codes: &[&str]) -> (SocketAddr, Self) {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let service = Self {
                codes: codes.iter().map(|c| (*c).to_string()).collect(),
                calls: Arc::default(),
            };
            let server = tonic::transport::Server::builder()
                .add_service(service.clone())
                .serve(addr);
            tokio::spawn(server);

            // The listener is rebound by the server; wait until it accepts.
            for _ in 0..100 {
                if tokio::net::TcpStream::connect(addr).await.is_ok() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            (addr, service)
        }
    }

    struct Supported {
        path: String,
        codes: Vec<String>,
    }

    impl UnaryService<Empty> for Supported {
        type Response = GetSupportedCurrenciesResponse;
        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;

        fn call(&mut self, _request: tonic::Request<Empty>) -> Self::Future {
            let path = self.path.clone();
            let codes = self.codes.clone();
            Box::pin(async move {
                if path != GET_SUPPORTED_CURRENCIES {
                    return Err(tonic::Status::unimplemented(path));
                }
                Ok(tonic::Response::new(GetSupportedCurrenciesResponse {
                    currency_codes: codes,
                }))
            })
        }
    }

    impl Service<http::Request<Body>> for CurrencyService {
        type Response = http::Response<Body>;
        type Error = Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: http::Request<Body>) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let method = Supported {
                path: request.uri().path().to_string(),
                codes: self.codes.clone(),
            };
            Box::pin(async move {
                let codec: ProstCodec<GetSupportedCurrenciesResponse, Empty> =
                    ProstCodec::default();
                let mut grpc = Grpc::new(codec);
                Ok(grpc.unary(method, request).await)
            })
        }
    }

    impl NamedService for CurrencyService {
        const NAME: &'static str = "hipstershop.CurrencyService";
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::Uri;
    use prost::Message;

    use super::{CurrencyClient, Empty, GetSupportedCurrenciesResponse, test::CurrencyService};

    #[test]
    fn empty_request_has_no_bytes() {
        assert!(Empty {}.encode_to_vec().is_empty());
    }

    #[test]
    fn response_decodes_repeated_codes() {
        // field 1, length delimited, "EUR" then "JPY"
        let wire = [0x0a, 0x03, b'E', b'U', b'R', 0x0a, 0x03, b'J', b'P', b'Y'];
        let response = GetSupportedCurrenciesResponse::decode(&wire[..]).unwrap();
        assert_eq!(response.currency_codes, vec!["EUR", "JPY"]);
    }

    #[tokio::test]
    async fn supported_currencies_round_trip_a_server() {
        let (addr, service) = CurrencyService::spawn(&["EUR", "USD", "JPY"]).await;
        let uri: Uri = format!("http://{addr}").parse().unwrap();

        let mut client = CurrencyClient::connect(uri, Duration::from_secs(5))
            .await
            .unwrap();
        let response = client.get_supported_currencies().await.unwrap();

        assert_eq!(response.currency_codes, vec!["EUR", "USD", "JPY"]);
        assert_eq!(service.calls(), 1);
    }
}
