use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use freddie_core::domain::cart::Cart;
use freddie_core::domain::conversation::{ConversationKey, ConversationTurn, Role};
use freddie_core::domain::order::{next_order_number, Order, OrderId, OrderStatus};

use super::{CartRepository, OrderRepository, RepositoryError, Session, SessionRepository};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
    high_water: Mutex<u64>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let key = OrderId::normalize(&id.0);
        let orders = self.orders.read().await;
        Ok(orders.get(&key.0).cloned())
    }

    async fn reserve_id(&self) -> Result<OrderId, RepositoryError> {
        let mut high_water = self.high_water.lock().await;
        let orders = self.orders.read().await;
        let used = orders.values().filter_map(|order| order.id.number());
        let next = next_order_number(used.chain(std::iter::once(*high_water)));
        *high_water = next;
        Ok(OrderId::from_number(next))
    }

    async fn save(&self, mut order: Order) -> Result<(), RepositoryError> {
        let mut high_water = self.high_water.lock().await;
        let mut orders = self.orders.write().await;
        let key = OrderId::normalize(&order.id.0);
        if orders.contains_key(&key.0) {
            return Err(RepositoryError::Conflict(format!("order {key} already exists")));
        }
        if let Some(number) = key.number() {
            *high_water = (*high_water).max(number);
        }
        order.id = key.clone();
        orders.insert(key.0, order);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let key = OrderId::normalize(&id.0);
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&key.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {key}")))?;
        order.transition_to(status)?;
        Ok(order.clone())
    }

    async fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut listed: Vec<Order> = orders.values().cloned().collect();
        listed.sort_by(|left, right| {
            left.id.number().cmp(&right.id.number()).then_with(|| left.id.cmp(&right.id))
        });
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: RwLock<HashMap<String, Cart>>,
}

#[async_trait::async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn load(&self, user_id: &str) -> Result<Cart, RepositoryError> {
        let carts = self.carts.read().await;
        Ok(carts.get(user_id).cloned().unwrap_or_default())
    }

    async fn save(&self, user_id: &str, cart: Cart) -> Result<(), RepositoryError> {
        let mut carts = self.carts.write().await;
        if cart.is_empty() {
            carts.remove(user_id);
        } else {
            carts.insert(user_id.to_string(), cart);
        }
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<Cart, RepositoryError> {
        let mut carts = self.carts.write().await;
        Ok(carts.remove(user_id).unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<ConversationKey, Session>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get_or_create(&self, key: &ConversationKey) -> Result<Session, RepositoryError> {
        if let Some(session) = self.sessions.read().await.get(key) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(key.clone()).or_insert_with(|| Session::new(key.clone()));
        Ok(session.clone())
    }

    async fn append(
        &self,
        key: &ConversationKey,
        expected_version: u64,
        turns: Vec<ConversationTurn>,
        active_role: Role,
    ) -> Result<Session, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(key.clone()).or_insert_with(|| Session::new(key.clone()));
        if session.version != expected_version {
            return Err(RepositoryError::Conflict(format!(
                "session {key} is at version {}, expected {expected_version}",
                session.version
            )));
        }

        session.turns.extend(turns);
        session.active_role = active_role;
        session.version += 1;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.sessions.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use freddie_core::domain::cart::{Cart, CartLineItem};
    use freddie_core::domain::conversation::{ConversationKey, ConversationTurn, Role};
    use freddie_core::domain::order::{Order, OrderId, OrderStatus};
    use freddie_core::domain::product::{ProductId, Size};

    use crate::repositories::{
        CartRepository, InMemoryCartRepository, InMemoryOrderRepository,
        InMemorySessionRepository, OrderRepository, RepositoryError, SessionRepository,
    };

    fn line(quantity: u32) -> CartLineItem {
        CartLineItem {
            product_id: ProductId("walking".to_string()),
            size: Size::Large,
            quantity,
            unit_price: Decimal::new(6999, 2),
        }
    }

    fn order(id: &str) -> Order {
        Order {
            id: OrderId(id.to_string()),
            items: vec![line(1)],
            status: OrderStatus::Processing,
            contact: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn order_lookup_ignores_case() {
        let repo = InMemoryOrderRepository::default();
        repo.save(order("ORD1001")).await.expect("save order");

        let lower = repo.find_by_id(&OrderId("ord1001".to_string())).await.expect("lower");
        let upper = repo.find_by_id(&OrderId("ORD1001".to_string())).await.expect("upper");

        assert!(lower.is_some());
        assert_eq!(lower, upper);
    }

    #[tokio::test]
    async fn reserved_ids_strictly_increase_past_saved_orders() {
        let repo = InMemoryOrderRepository::default();
        assert_eq!(repo.reserve_id().await.expect("first").0, "ORD1001");

        repo.save(order("ORD1005")).await.expect("save order");
        let next = repo.reserve_id().await.expect("next");
        let after = repo.reserve_id().await.expect("after");

        assert_eq!(next.0, "ORD1006");
        assert_eq!(after.0, "ORD1007");
    }

    #[tokio::test]
    async fn saving_an_existing_id_conflicts() {
        let repo = InMemoryOrderRepository::default();
        repo.save(order("ORD1001")).await.expect("save order");

        let error = repo.save(order("ord1001")).await.expect_err("duplicate");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn status_updates_follow_the_lifecycle() {
        let repo = InMemoryOrderRepository::default();
        repo.save(order("ORD1001")).await.expect("save order");
        let id = OrderId("ORD1001".to_string());

        let shipped = repo.update_status(&id, OrderStatus::Shipped).await.expect("ship");
        assert_eq!(shipped.status, OrderStatus::Shipped);

        let error = repo.update_status(&id, OrderStatus::Processing).await.expect_err("rewind");
        assert!(matches!(error, RepositoryError::Domain(_)));

        let missing = repo
            .update_status(&OrderId("ORD9999".to_string()), OrderStatus::Shipped)
            .await
            .expect_err("missing");
        assert!(matches!(missing, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn carts_are_isolated_per_user_and_clear_returns_contents() {
        let repo = InMemoryCartRepository::default();
        let mut cart = Cart::new();
        cart.add(line(2)).expect("add");
        repo.save("alice", cart.clone()).await.expect("save cart");

        assert!(repo.load("bob").await.expect("load bob").is_empty());
        assert_eq!(repo.clear("alice").await.expect("clear"), cart);
        assert!(repo.load("alice").await.expect("reload").is_empty());
    }

    #[tokio::test]
    async fn sessions_grow_and_version_on_append() {
        let repo = InMemorySessionRepository::default();
        let key = ConversationKey::new("zaid", Some("z@example.com"));

        let fresh = repo.get_or_create(&key).await.expect("create");
        assert!(fresh.turns.is_empty());
        assert_eq!(fresh.version, 0);
        assert_eq!(fresh.active_role, Role::General);

        let first = repo
            .append(
                &key,
                0,
                vec![ConversationTurn::user("hi"), ConversationTurn::assistant("hello")],
                Role::General,
            )
            .await
            .expect("append");
        let second = repo
            .append(&key, 1, vec![ConversationTurn::user("cart?")], Role::CartSpecialist)
            .await
            .expect("append again");

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.turns.len(), 3);
        assert_eq!(second.turns[0], ConversationTurn::user("hi"));
        assert_eq!(second.active_role, Role::CartSpecialist);
        assert_eq!(repo.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn stale_session_append_is_rejected() {
        let repo = InMemorySessionRepository::default();
        let key = ConversationKey::new("zaid", None);
        repo.append(&key, 0, vec![ConversationTurn::user("one")], Role::General)
            .await
            .expect("append");

        let error = repo
            .append(&key, 0, vec![ConversationTurn::user("two")], Role::General)
            .await
            .expect_err("stale version");
        assert!(matches!(error, RepositoryError::Conflict(_)));
        assert_eq!(repo.get_or_create(&key).await.expect("get").turns.len(), 1);
    }
}
