// Profile Repository Port
// Reads and URL replacement outside the intake transaction

use crate::domain::{FoundUrl, RequestId, RequestRecord, StoredProfile, UserId};
use crate::error::Result;
use async_trait::async_trait;

/// Profile persistence (one implementation per store)
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Most recent request of a user
    ///
    /// # Returns
    /// None when the user has never submitted a request
    async fn find_latest_request(&self, user_id: UserId) -> Result<Option<RequestRecord>>;

    /// Replace the URL set of a request atomically
    ///
    /// Duplicates in `urls` are stored once. Running it twice with the same
    /// input leaves the same final set.
    ///
    /// # Returns
    /// Number of URLs stored
    async fn replace_found_urls(&self, request_id: RequestId, urls: &[String]) -> Result<u64>;

    /// URLs stored for a request, newest first
    async fn find_found_urls(&self, request_id: RequestId) -> Result<Vec<FoundUrl>>;

    /// Profile, latest answers, latest request and its URLs
    async fn find_profile(&self, user_id: UserId) -> Result<Option<StoredProfile>>;
}

// ============================================================================
// In-Memory Repository for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{NewUser, ProfileAnswers, UserSummary};
    use crate::error::AppError;
    use crate::port::transaction::{
        ProfileTransaction, Transaction, TransactionalProfileRepository,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Tables {
        users: Vec<(UserId, NewUser)>,
        tests: Vec<(i64, ProfileAnswers)>,
        requests: Vec<RequestRecord>,
        found_urls: Vec<(RequestId, FoundUrl)>,
        clock: i64,
        fail_next: usize,
        replace_calls: usize,
    }

    impl Tables {
        fn tick(&mut self) -> i64 {
            self.clock += 1;
            self.clock
        }

        fn take_failure(&mut self) -> Result<()> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(AppError::Database("database is locked".to_string()));
            }
            Ok(())
        }
    }

    /// In-memory profile store implementing both repository ports
    #[derive(Clone, Default)]
    pub struct InMemoryProfileRepository {
        tables: Arc<Mutex<Tables>>,
    }

    impl InMemoryProfileRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` operations fail with a database error
        pub fn fail_next(&self, n: usize) {
            self.tables.lock().unwrap().fail_next = n;
        }

        pub fn user_count(&self) -> usize {
            self.tables.lock().unwrap().users.len()
        }

        pub fn test_count(&self) -> usize {
            self.tables.lock().unwrap().tests.len()
        }

        pub fn request_count(&self) -> usize {
            self.tables.lock().unwrap().requests.len()
        }

        pub fn replace_calls(&self) -> usize {
            self.tables.lock().unwrap().replace_calls
        }

        /// Stored URLs of a request, in insertion order
        pub fn urls_for(&self, request_id: RequestId) -> Vec<String> {
            self.tables
                .lock()
                .unwrap()
                .found_urls
                .iter()
                .filter(|(id, _)| *id == request_id)
                .map(|(_, u)| u.url.clone())
                .collect()
        }

        /// Insert a complete user/test/request triple, returns (user_id, request_id)
        pub fn seed_request(&self, nombre: &str, comentario: &str) -> (UserId, RequestId) {
            let mut t = self.tables.lock().unwrap();
            let user_id = t.users.len() as i64 + 1;
            t.users.push((
                user_id,
                NewUser {
                    nombre: nombre.to_string(),
                    edad: 30,
                    correo: None,
                },
            ));
            let test_id = t.tests.len() as i64 + 1;
            t.tests.push((test_id, ProfileAnswers::default()));
            let request_id = t.requests.len() as i64 + 1;
            let created_at = t.tick();
            t.requests.push(RequestRecord {
                id: request_id,
                user_id,
                test_id,
                comentario: comentario.to_string(),
                created_at,
            });
            (user_id, request_id)
        }
    }

    #[async_trait]
    impl ProfileRepository for InMemoryProfileRepository {
        async fn find_latest_request(&self, user_id: UserId) -> Result<Option<RequestRecord>> {
            let mut t = self.tables.lock().unwrap();
            t.take_failure()?;
            Ok(t
                .requests
                .iter()
                .filter(|r| r.user_id == user_id)
                .max_by_key(|r| r.id)
                .cloned())
        }

        async fn replace_found_urls(&self, request_id: RequestId, urls: &[String]) -> Result<u64> {
            let mut t = self.tables.lock().unwrap();
            t.take_failure()?;
            t.replace_calls += 1;
            t.found_urls.retain(|(id, _)| *id != request_id);
            let mut stored = 0;
            for url in urls {
                if t
                    .found_urls
                    .iter()
                    .any(|(id, u)| *id == request_id && &u.url == url)
                {
                    continue;
                }
                let found_at = t.tick();
                t.found_urls.push((
                    request_id,
                    FoundUrl {
                        url: url.clone(),
                        found_at,
                    },
                ));
                stored += 1;
            }
            Ok(stored)
        }

        async fn find_found_urls(&self, request_id: RequestId) -> Result<Vec<FoundUrl>> {
            let mut t = self.tables.lock().unwrap();
            t.take_failure()?;
            let mut urls: Vec<FoundUrl> = t
                .found_urls
                .iter()
                .filter(|(id, _)| *id == request_id)
                .map(|(_, u)| u.clone())
                .collect();
            urls.sort_by(|a, b| b.found_at.cmp(&a.found_at));
            Ok(urls)
        }

        async fn find_profile(&self, user_id: UserId) -> Result<Option<StoredProfile>> {
            let request = self.find_latest_request(user_id).await?;
            let urls = match &request {
                Some(r) => self.find_found_urls(r.id).await?,
                None => Vec::new(),
            };

            let t = self.tables.lock().unwrap();
            let Some((_, user)) = t.users.iter().find(|(id, _)| *id == user_id) else {
                return Ok(None);
            };
            let answers = request
                .as_ref()
                .and_then(|r| t.tests.iter().find(|(id, _)| *id == r.test_id))
                .map(|(_, a)| a.clone())
                .unwrap_or_default();

            Ok(Some(StoredProfile {
                user: UserSummary {
                    id: Some(user_id),
                    nombre: user.nombre.clone(),
                    edad: user.edad,
                    correo: user.correo.clone(),
                },
                answers,
                request,
                urls,
            }))
        }
    }

    #[async_trait]
    impl TransactionalProfileRepository for InMemoryProfileRepository {
        async fn begin_transaction(&self) -> Result<Box<dyn ProfileTransaction>> {
            self.tables.lock().unwrap().take_failure()?;
            Ok(Box::new(InMemoryProfileTransaction {
                tables: self.tables.clone(),
                user: None,
                test: None,
                request: None,
            }))
        }
    }

    /// Buffers inserts until commit
    struct InMemoryProfileTransaction {
        tables: Arc<Mutex<Tables>>,
        user: Option<(UserId, NewUser)>,
        test: Option<(i64, ProfileAnswers)>,
        request: Option<(RequestId, UserId, i64, String)>,
    }

    #[async_trait]
    impl Transaction for InMemoryProfileTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let mut t = self.tables.lock().unwrap();
            t.take_failure()?;
            if let Some(user) = self.user {
                t.users.push(user);
            }
            if let Some(test) = self.test {
                t.tests.push(test);
            }
            if let Some((id, user_id, test_id, comentario)) = self.request {
                let created_at = t.tick();
                t.requests.push(RequestRecord {
                    id,
                    user_id,
                    test_id,
                    comentario,
                    created_at,
                });
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ProfileTransaction for InMemoryProfileTransaction {
        async fn insert_user(&mut self, user: &NewUser) -> Result<UserId> {
            let mut t = self.tables.lock().unwrap();
            t.take_failure()?;
            let id = t.users.len() as i64 + 1;
            self.user = Some((id, user.clone()));
            Ok(id)
        }

        async fn insert_test(&mut self, answers: &ProfileAnswers) -> Result<i64> {
            let mut t = self.tables.lock().unwrap();
            t.take_failure()?;
            let id = t.tests.len() as i64 + 1;
            self.test = Some((id, answers.clone()));
            Ok(id)
        }

        async fn insert_request(
            &mut self,
            user_id: UserId,
            test_id: i64,
            comentario: &str,
        ) -> Result<RequestId> {
            let mut t = self.tables.lock().unwrap();
            t.take_failure()?;
            let id = t.requests.len() as i64 + 1;
            self.request = Some((id, user_id, test_id, comentario.to_string()));
            Ok(id)
        }
    }
}
